//! Simulated CiA 402 drive.
//!
//! `SimulatedDrive` answers register accesses for one node the way a
//! stepper/BLDC controller does:
//!
//! - Control-word writes walk the DS402 power graph; a rising edge of bit 7
//!   resets a fault once its cause is gone
//! - The mode of operation is mirrored into the mode display
//! - Homing, profile position, velocity and auto setup run as processes on
//!   a simulated clock; only [`RegisterAccess::sleep`] and
//!   [`SimulatedDrive::advance`] move it
//! - Writing the save signature to 0x1010 stores a parameter group after
//!   the configured save time
//!
//! Faults, lost communication and digital inputs can be injected from
//! tests.

use crate::config::SimulationConfig;
use crate::dictionary::ObjectDictionary;
use crate::state::{DriveSnapshot, ObjectValue};
use nano402_common::bus::{RegisterAccess, RegisterError};
use nano402_common::drive::state::{OperationMode, PowerState};
use nano402_common::drive::words::{ControlWord, PowerCommand, StatusWord};
use nano402_common::od::{self, BitWidth, OdIndex, SAVE_SIGNATURE};
use nano402_control::DeviceFault;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::fmt;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

/// Entries kept in the error history (0x1003).
pub const ERROR_HISTORY_DEPTH: usize = 8;

const ABORT_RANGE: &str = "value range of parameter exceeded";
const ABORT_STORE: &str = "data cannot be transferred or stored to the application";

/// CANopen node a drive answers on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId(pub u8);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node {}", self.0)
    }
}

// ─── Processes ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HomingPhase {
    Idle,
    Running { since: Duration },
    Attained,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AutoSetupPhase {
    Idle,
    Running { since: Duration },
    Done,
}

#[derive(Debug, Clone, Copy)]
struct PendingSave {
    address: OdIndex,
    since: Duration,
}

/// Mutable drive state behind the `RefCell`.
struct DriveCore {
    config: SimulationConfig,
    dictionary: ObjectDictionary,
    state: PowerState,
    clock: Duration,
    boot_deadline: Option<Duration>,
    fault_deadline: Option<Duration>,
    fault_latched: bool,
    history: Vec<u32>,
    connected: bool,

    homing: HomingPhase,
    homing_active: bool,
    fail_next_homing: bool,
    setpoint_acknowledged: bool,
    destination: Option<i32>,
    auto_setup: AutoSetupPhase,
    pending_save: Option<PendingSave>,
    saved: Vec<u8>,
}

impl DriveCore {
    fn new(config: SimulationConfig) -> Self {
        let dictionary = ObjectDictionary::with_defaults(&config.device_name);
        Self {
            config,
            dictionary,
            state: PowerState::SwitchOnDisabled,
            clock: Duration::ZERO,
            boot_deadline: None,
            fault_deadline: None,
            fault_latched: false,
            history: Vec::new(),
            connected: true,
            homing: HomingPhase::Idle,
            homing_active: false,
            fail_next_homing: false,
            setpoint_acknowledged: false,
            destination: None,
            auto_setup: AutoSetupPhase::Idle,
            pending_save: None,
            saved: Vec::new(),
        }
    }

    fn value(&self, address: OdIndex) -> i64 {
        self.dictionary.get(address).unwrap_or(0)
    }

    fn control_word(&self) -> ControlWord {
        ControlWord::from_bits_retain(self.value(od::CONTROL_WORD) as u16)
    }

    fn mode(&self) -> Option<OperationMode> {
        OperationMode::from_i8(self.value(od::MODE_OF_OPERATION_DISPLAY) as i8)
    }

    fn running_in(&self, mode: OperationMode) -> bool {
        self.state == PowerState::OperationEnabled && self.mode() == Some(mode)
    }

    fn status_word(&self) -> StatusWord {
        let mut status = StatusWord::from_bits_retain(self.state.status_bits());
        status.set(StatusWord::REMOTE, self.config.remote);
        status.set(
            StatusWord::VOLTAGE_ENABLED,
            matches!(
                self.state,
                PowerState::ReadyToSwitchOn
                    | PowerState::SwitchedOn
                    | PowerState::OperationEnabled
                    | PowerState::QuickStopActive
            ),
        );

        match self.mode() {
            Some(OperationMode::Homing) => status.insert(match self.homing {
                HomingPhase::Idle => StatusWord::TARGET_REACHED,
                HomingPhase::Running { .. } => StatusWord::empty(),
                HomingPhase::Attained => StatusWord::TARGET_REACHED | StatusWord::OP_SPECIFIC_12,
                HomingPhase::Failed => StatusWord::TARGET_REACHED | StatusWord::OP_SPECIFIC_13,
            }),
            Some(OperationMode::ProfilePosition) => {
                status.set(StatusWord::OP_SPECIFIC_12, self.setpoint_acknowledged);
                status.set(StatusWord::TARGET_REACHED, self.destination.is_none());
            }
            Some(OperationMode::Velocity) => status.set(
                StatusWord::TARGET_REACHED,
                self.value(od::VL_VELOCITY_ACTUAL) == self.value(od::VL_VELOCITY_DEMAND),
            ),
            Some(OperationMode::AutoSetup) => {
                status.set(StatusWord::OP_SPECIFIC_12, self.auto_setup == AutoSetupPhase::Done);
            }
            _ => {}
        }
        status
    }

    // ─── Bus Writes ─────────────────────────────────────────────────

    fn write(&mut self, address: OdIndex, value: i64, width: BitWidth) -> Result<(), RegisterError> {
        if address == od::CONTROL_WORD {
            let previous = self.control_word();
            let stored = self.dictionary.write(address, value, width)?;
            self.apply_control_word(previous, ControlWord::from_bits_retain(stored as u16));
        } else if address == od::MODE_OF_OPERATION {
            let previous = self.value(address);
            let stored = self.dictionary.write(address, value, width)?;
            if OperationMode::from_i8(stored as i8).is_none() {
                self.dictionary.set(address, previous);
                return Err(rejected(address, ABORT_RANGE));
            }
            self.dictionary.set(od::MODE_OF_OPERATION_DISPLAY, stored);
            debug!(mode = stored, "mode of operation changed");
        } else if address.index == od::STORE_PARAMETERS {
            let stored = self.dictionary.write(address, value, width)?;
            if stored != i64::from(SAVE_SIGNATURE) {
                self.dictionary.set(address, 1);
                return Err(rejected(address, ABORT_STORE));
            }
            self.dictionary.set(address, 0);
            self.pending_save = Some(PendingSave {
                address,
                since: self.clock,
            });
        } else {
            self.dictionary.write(address, value, width)?;
        }
        self.step(Duration::ZERO);
        Ok(())
    }

    fn apply_control_word(&mut self, previous: ControlWord, word: ControlWord) {
        let next = match self.state {
            PowerState::NotReadyToSwitchOn | PowerState::FaultReactionActive => self.state,
            PowerState::Fault => {
                let rising = !previous.contains(ControlWord::FAULT_RESET)
                    && word.contains(ControlWord::FAULT_RESET);
                if rising && !self.fault_latched {
                    info!("fault reset");
                    PowerState::SwitchOnDisabled
                } else {
                    PowerState::Fault
                }
            }
            state => PowerCommand::from_control_word(word)
                .map_or(state, |command| transition(state, command)),
        };
        if next != self.state {
            debug!(from = %self.state, to = %next, "power state");
            self.state = next;
        }
    }

    // ─── Simulated Time ─────────────────────────────────────────────

    fn step(&mut self, dt: Duration) {
        self.clock += dt;
        self.update_power();
        if self.state != PowerState::OperationEnabled {
            self.destination = None;
        }
        self.update_homing();
        self.update_positioning(dt);
        self.update_velocity(dt);
        self.update_auto_setup();
        self.update_save();
    }

    fn elapsed_since(&self, since: Duration) -> Duration {
        self.clock.saturating_sub(since)
    }

    fn update_power(&mut self) {
        if let Some(deadline) = self.boot_deadline {
            if self.clock >= deadline {
                self.boot_deadline = None;
                self.state = PowerState::SwitchOnDisabled;
                info!("drive booted");
            }
        }
        if let Some(deadline) = self.fault_deadline {
            if self.clock >= deadline {
                self.fault_deadline = None;
                self.state = PowerState::Fault;
                debug!("fault reaction finished");
            }
        }
    }

    fn update_homing(&mut self) {
        let active = self.running_in(OperationMode::Homing)
            && self.control_word().contains(ControlWord::START);
        let edge = active && !self.homing_active;
        self.homing_active = active;

        self.homing = match self.homing {
            HomingPhase::Running { .. } if !active => {
                warn!("reference run interrupted");
                HomingPhase::Idle
            }
            HomingPhase::Running { since }
                if self.elapsed_since(since) >= self.config.homing_time() =>
            {
                if std::mem::take(&mut self.fail_next_homing) {
                    warn!("reference run failed");
                    HomingPhase::Failed
                } else {
                    self.dictionary
                        .set(od::POSITION_ACTUAL, i64::from(self.config.home_offset));
                    info!(position = self.config.home_offset, "reference run completed");
                    HomingPhase::Attained
                }
            }
            _ if edge => {
                debug!(method = self.value(od::HOMING_METHOD), "reference run started");
                HomingPhase::Running { since: self.clock }
            }
            phase => phase,
        };
    }

    fn update_positioning(&mut self, dt: Duration) {
        let word = self.control_word();
        if !word.contains(ControlWord::START) {
            self.setpoint_acknowledged = false;
        }
        if !self.running_in(OperationMode::ProfilePosition) {
            return;
        }

        let actual = self.value(od::POSITION_ACTUAL);
        if word.contains(ControlWord::START) && !self.setpoint_acknowledged {
            let target = self.value(od::TARGET_POSITION);
            let destination = if word.contains(ControlWord::RELATIVE) {
                actual + target
            } else {
                target
            };
            let destination = destination.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32;
            debug!(destination, "set-point accepted");
            self.destination = Some(destination);
            self.setpoint_acknowledged = true;
        }
        if word.contains(ControlWord::HALT) {
            self.destination = None;
        }

        let Some(destination) = self.destination else {
            self.dictionary.set(od::VELOCITY_ACTUAL, 0);
            return;
        };
        let speed = self.value(od::PROFILE_VELOCITY);
        let next = move_towards(actual, i64::from(destination), distance(speed, 1, dt));
        self.dictionary.set(od::POSITION_ACTUAL, next);
        if next == i64::from(destination) {
            self.destination = None;
            self.dictionary.set(od::VELOCITY_ACTUAL, 0);
            debug!(position = next, "target reached");
        } else {
            self.dictionary
                .set(od::VELOCITY_ACTUAL, speed * (i64::from(destination) - next).signum());
        }
    }

    fn update_velocity(&mut self, dt: Duration) {
        if !self.running_in(OperationMode::Velocity) {
            self.dictionary.set(od::VL_VELOCITY_DEMAND, 0);
            self.dictionary.set(od::VL_VELOCITY_ACTUAL, 0);
            return;
        }

        let demand = if self.control_word().contains(ControlWord::HALT) {
            0
        } else {
            self.value(od::VL_TARGET_VELOCITY)
        };
        let actual = self.value(od::VL_VELOCITY_ACTUAL);
        let ramp = if demand.abs() >= actual.abs() && demand.signum() * actual.signum() >= 0 {
            od::VL_ACCELERATION
        } else {
            od::VL_DECELERATION
        };
        let step = distance(
            self.value(OdIndex::new(ramp, 1)),
            self.value(OdIndex::new(ramp, 2)),
            dt,
        );
        let next = move_towards(actual, demand, step);

        self.dictionary.set(od::VL_VELOCITY_DEMAND, demand);
        self.dictionary.set(od::VL_VELOCITY_ACTUAL, next);
        self.dictionary.set(od::VELOCITY_ACTUAL, next);
    }

    fn update_auto_setup(&mut self) {
        let active = self.running_in(OperationMode::AutoSetup)
            && self.control_word().contains(ControlWord::START);

        self.auto_setup = match self.auto_setup {
            _ if !active => AutoSetupPhase::Idle,
            AutoSetupPhase::Idle => {
                debug!("motor identification started");
                AutoSetupPhase::Running { since: self.clock }
            }
            AutoSetupPhase::Running { since }
                if self.elapsed_since(since) >= self.config.auto_setup_time() =>
            {
                info!("motor identification completed");
                AutoSetupPhase::Done
            }
            phase => phase,
        };
    }

    fn update_save(&mut self) {
        let Some(save) = self.pending_save else {
            return;
        };
        if self.elapsed_since(save.since) >= self.config.save_time() {
            self.dictionary.set(save.address, 1);
            self.saved.push(save.address.subindex);
            self.pending_save = None;
            info!(group = save.address.subindex, "parameters stored");
        }
    }

    // ─── Faults ─────────────────────────────────────────────────────

    fn raise_fault(&mut self, fault: DeviceFault, latched: bool) {
        warn!(
            code = format_args!("{:#06x}", fault.code),
            latched, "drive fault"
        );
        self.history.insert(0, fault.to_raw());
        self.history.truncate(ERROR_HISTORY_DEPTH);
        self.fault_latched |= latched;
        if matches!(self.homing, HomingPhase::Running { .. }) {
            self.homing = HomingPhase::Idle;
        }

        if self.state != PowerState::Fault {
            let reaction = self.config.fault_reaction_time();
            if reaction.is_zero() {
                self.state = PowerState::Fault;
            } else {
                self.state = PowerState::FaultReactionActive;
                self.fault_deadline = Some(self.clock + reaction);
            }
        }
        self.step(Duration::ZERO);
    }
}

// ─── Power Graph ────────────────────────────────────────────────────

/// Drive-side DS402 transition for a decoded command.
fn transition(state: PowerState, command: PowerCommand) -> PowerState {
    use PowerCommand as C;
    use PowerState as S;

    match (state, command) {
        (S::SwitchOnDisabled, C::Shutdown) => S::ReadyToSwitchOn,
        (S::ReadyToSwitchOn, C::SwitchOn | C::DisableOperation) => S::SwitchedOn,
        (S::SwitchedOn | S::QuickStopActive, C::EnableOperation) => S::OperationEnabled,
        (S::SwitchedOn | S::OperationEnabled, C::Shutdown) => S::ReadyToSwitchOn,
        (S::OperationEnabled, C::SwitchOn | C::DisableOperation) => S::SwitchedOn,
        (S::OperationEnabled, C::QuickStop) => S::QuickStopActive,
        (
            S::ReadyToSwitchOn | S::SwitchedOn | S::OperationEnabled | S::QuickStopActive,
            C::DisableVoltage,
        ) => S::SwitchOnDisabled,
        (S::ReadyToSwitchOn | S::SwitchedOn, C::QuickStop) => S::SwitchOnDisabled,
        (state, _) => state,
    }
}

/// Units covered in `dt` at `delta` units per `per_seconds`. At least one
/// unit for any non-zero interval; unbounded when `per_seconds` is zero.
fn distance(delta: i64, per_seconds: i64, dt: Duration) -> i64 {
    if dt.is_zero() {
        return 0;
    }
    if per_seconds <= 0 {
        return i64::MAX;
    }
    let millis = i64::try_from(dt.as_millis()).unwrap_or(i64::MAX);
    (delta.saturating_mul(millis) / (per_seconds * 1000)).max(1)
}

fn move_towards(actual: i64, target: i64, step: i64) -> i64 {
    actual + (target - actual).clamp(-step, step)
}

fn rejected(address: OdIndex, reason: &str) -> RegisterError {
    RegisterError::Rejected {
        address,
        reason: reason.to_string(),
    }
}

// ─── SimulatedDrive ─────────────────────────────────────────────────

/// A simulated drive on one node.
pub struct SimulatedDrive {
    node: NodeId,
    core: RefCell<DriveCore>,
}

impl SimulatedDrive {
    /// A drive in switch on disabled, factory parameters, clock at zero.
    pub fn new(config: SimulationConfig) -> Self {
        info!(node = config.node_id, device = %config.device_name, "simulated drive ready");
        Self {
            node: NodeId(config.node_id),
            core: RefCell::new(DriveCore::new(config)),
        }
    }

    /// The handle controllers pass as the device.
    pub const fn node(&self) -> NodeId {
        self.node
    }

    pub fn config(&self) -> SimulationConfig {
        self.core.borrow().config.clone()
    }

    /// Simulated time since creation.
    pub fn now(&self) -> Duration {
        self.core.borrow().clock
    }

    /// Advance simulated time, running every active process.
    pub fn advance(&self, period: Duration) {
        self.core.borrow_mut().step(period);
    }

    pub fn power_state(&self) -> PowerState {
        self.core.borrow().state
    }

    pub fn status_word(&self) -> u16 {
        self.core.borrow().status_word().bits()
    }

    /// Current value of an integer object, bypassing the bus.
    pub fn value(&self, address: OdIndex) -> Option<i64> {
        self.core.borrow().dictionary.get(address)
    }

    /// Save groups stored so far, by 0x1010 subindex.
    pub fn saved_groups(&self) -> Vec<u8> {
        self.core.borrow().saved.clone()
    }

    // ─── Injection ──────────────────────────────────────────────────

    /// Raise a fault that a fault reset clears.
    pub fn inject_fault(&self, fault: DeviceFault) {
        self.core.borrow_mut().raise_fault(fault, false);
    }

    /// Raise a fault that survives fault resets until [`Self::clear_fault_cause`].
    pub fn inject_persistent_fault(&self, fault: DeviceFault) {
        self.core.borrow_mut().raise_fault(fault, true);
    }

    pub fn clear_fault_cause(&self) {
        self.core.borrow_mut().fault_latched = false;
    }

    pub fn clear_error_history(&self) {
        self.core.borrow_mut().history.clear();
    }

    /// Let the next reference run end in a homing error.
    pub fn fail_next_homing(&self) {
        self.core.borrow_mut().fail_next_homing = true;
    }

    /// Drive the physical inputs (bits 16–23 of 0x60FD).
    pub fn set_digital_inputs(&self, inputs: u8) {
        self.core
            .borrow_mut()
            .dictionary
            .set(od::DIGITAL_INPUTS, i64::from(inputs) << 16);
    }

    /// Take the drive off the bus (`false`) or put it back.
    pub fn set_connected(&self, connected: bool) {
        self.core.borrow_mut().connected = connected;
    }

    /// Switch the drive off and on again: volatile state is lost and the
    /// drive is not ready to switch on until it has booted.
    pub fn power_cycle(&self) {
        let mut core = self.core.borrow_mut();
        let mut fresh = DriveCore::new(core.config.clone());
        for (address, value) in core.dictionary.writable() {
            fresh.dictionary.set(address, value);
        }
        fresh.dictionary.set(od::CONTROL_WORD, 0);
        let mode = fresh.value(od::MODE_OF_OPERATION);
        fresh.dictionary.set(od::MODE_OF_OPERATION_DISPLAY, mode);
        fresh.history = std::mem::take(&mut core.history);
        fresh.saved = std::mem::take(&mut core.saved);
        fresh.clock = core.clock;
        fresh.state = PowerState::NotReadyToSwitchOn;
        fresh.boot_deadline = Some(fresh.clock + fresh.config.boot_time());
        *core = fresh;
        core.step(Duration::ZERO);
        info!("power cycled");
    }

    // ─── Persistence ────────────────────────────────────────────────

    pub fn snapshot(&self) -> DriveSnapshot {
        let core = self.core.borrow();
        DriveSnapshot {
            version: DriveSnapshot::CURRENT_VERSION,
            saved_at: 0,
            node_id: self.node.0,
            power_state: core.state,
            clock_ms: u64::try_from(core.clock.as_millis()).unwrap_or(u64::MAX),
            position_actual: core.value(od::POSITION_ACTUAL) as i32,
            homed: core.homing == HomingPhase::Attained,
            objects: core
                .dictionary
                .writable()
                .map(|(address, value)| ObjectValue { address, value })
                .collect(),
            error_history: core.history.clone(),
        }
    }

    /// Load a snapshot taken from a drive on the same node.
    ///
    /// Running processes are not part of a snapshot; a drive caught in
    /// fault reaction resumes in fault.
    pub fn restore(&self, snapshot: &DriveSnapshot) {
        let mut core = self.core.borrow_mut();
        for object in &snapshot.objects {
            core.dictionary.set(object.address, object.value);
        }
        let mode = core.value(od::MODE_OF_OPERATION);
        core.dictionary.set(od::MODE_OF_OPERATION_DISPLAY, mode);
        core.dictionary
            .set(od::POSITION_ACTUAL, i64::from(snapshot.position_actual));
        core.state = match snapshot.power_state {
            PowerState::FaultReactionActive => PowerState::Fault,
            PowerState::NotReadyToSwitchOn => PowerState::SwitchOnDisabled,
            state => state,
        };
        core.clock = Duration::from_millis(snapshot.clock_ms);
        core.history = snapshot.error_history.clone();
        core.history.truncate(ERROR_HISTORY_DEPTH);
        if snapshot.homed {
            core.homing = HomingPhase::Attained;
        }
        core.homing_active = core.running_in(OperationMode::Homing)
            && core.control_word().contains(ControlWord::START);
        core.setpoint_acknowledged = core.control_word().contains(ControlWord::START);
        core.step(Duration::ZERO);
        debug!(state = %core.state, objects = snapshot.objects.len(), "snapshot restored");
    }

    fn reachable(&self, device: &NodeId) -> Result<(), RegisterError> {
        if *device != self.node || !self.core.borrow().connected {
            return Err(RegisterError::Communication(format!("{device} does not respond")));
        }
        Ok(())
    }
}

impl RegisterAccess for SimulatedDrive {
    type Device = NodeId;

    fn read_integer(&self, device: &NodeId, address: OdIndex) -> Result<i64, RegisterError> {
        self.reachable(device)?;
        let core = self.core.borrow();
        let value = if address == od::STATUS_WORD {
            i64::from(core.status_word().bits())
        } else {
            core.dictionary.read(address)?
        };
        trace!(%address, value, "sdo read");
        Ok(value)
    }

    fn write_integer(
        &self,
        device: &NodeId,
        value: i64,
        address: OdIndex,
        width: BitWidth,
    ) -> Result<(), RegisterError> {
        self.reachable(device)?;
        trace!(%address, value, "sdo write");
        self.core.borrow_mut().write(address, value, width)
    }

    fn read_string(&self, device: &NodeId, address: OdIndex) -> Result<String, RegisterError> {
        self.reachable(device)?;
        self.core.borrow().dictionary.read_string(address)
    }

    fn read_array(&self, device: &NodeId, index: u16) -> Result<Vec<i64>, RegisterError> {
        self.reachable(device)?;
        if index != od::ERROR_HISTORY {
            return Err(rejected(
                OdIndex::new(index, 0),
                "object does not exist in the object dictionary",
            ));
        }
        let core = self.core.borrow();
        let mut entries = Vec::with_capacity(core.history.len() + 1);
        entries.push(core.history.len() as i64);
        entries.extend(core.history.iter().map(|raw| i64::from(*raw)));
        Ok(entries)
    }

    fn sleep(&self, period: Duration) {
        self.advance(period);
    }
}

// ─── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    const NODE: NodeId = NodeId(1);

    fn drive() -> SimulatedDrive {
        SimulatedDrive::new(SimulationConfig::default())
    }

    fn write_control(drive: &SimulatedDrive, word: u16) {
        drive
            .write_integer(&NODE, i64::from(word), od::CONTROL_WORD, BitWidth::Bits16)
            .unwrap();
    }

    fn set_mode(drive: &SimulatedDrive, mode: OperationMode) {
        drive
            .write_integer(
                &NODE,
                i64::from(mode.as_i8()),
                od::MODE_OF_OPERATION,
                BitWidth::Bits8,
            )
            .unwrap();
    }

    fn enable(drive: &SimulatedDrive) {
        for word in [0x0006, 0x0007, 0x000F] {
            write_control(drive, word);
        }
    }

    #[test]
    fn starts_switch_on_disabled_and_remote() {
        let drive = drive();
        assert_eq!(drive.power_state(), PowerState::SwitchOnDisabled);
        assert_eq!(drive.status_word(), 0x0240);
    }

    #[test]
    fn walks_the_power_graph() {
        let drive = drive();
        let steps = [
            (0x0006, PowerState::ReadyToSwitchOn),
            (0x0007, PowerState::SwitchedOn),
            (0x000F, PowerState::OperationEnabled),
            (0x0007, PowerState::SwitchedOn),
            (0x000F, PowerState::OperationEnabled),
            (0x000B, PowerState::QuickStopActive),
            (0x000F, PowerState::OperationEnabled),
            (0x0006, PowerState::ReadyToSwitchOn),
            (0x0000, PowerState::SwitchOnDisabled),
        ];
        for (word, state) in steps {
            write_control(&drive, word);
            assert_eq!(drive.power_state(), state, "after {word:#06x}");
            let status = drive.status_word();
            assert_eq!(PowerState::from_status_word(status), Some(state));
        }
    }

    #[test]
    fn fault_needs_a_rising_reset_edge() {
        let drive = drive();
        enable(&drive);
        drive.inject_fault(DeviceFault {
            code: 0x2310,
            class: 0x03,
            number: 1,
        });
        assert_eq!(drive.power_state(), PowerState::FaultReactionActive);

        drive.advance(Duration::from_millis(10));
        assert_eq!(drive.power_state(), PowerState::Fault);

        // Commands are ignored while in fault.
        write_control(&drive, 0x000F);
        assert_eq!(drive.power_state(), PowerState::Fault);

        write_control(&drive, 0x008F);
        assert_eq!(drive.power_state(), PowerState::SwitchOnDisabled);
    }

    #[test]
    fn persistent_fault_survives_resets() {
        let drive = drive();
        drive.inject_persistent_fault(DeviceFault::from_raw(0x0001_7500));
        drive.advance(Duration::from_millis(10));

        write_control(&drive, 0x0000);
        write_control(&drive, 0x0080);
        assert_eq!(drive.power_state(), PowerState::Fault);

        drive.clear_fault_cause();
        write_control(&drive, 0x0000);
        write_control(&drive, 0x0080);
        assert_eq!(drive.power_state(), PowerState::SwitchOnDisabled);
    }

    #[test]
    fn error_history_is_newest_first_and_bounded() {
        let drive = drive();
        for code in 0..10u16 {
            drive.inject_fault(DeviceFault {
                code: 0x1000 + code,
                class: 1,
                number: 0,
            });
        }
        let history = drive.read_array(&NODE, od::ERROR_HISTORY).unwrap();
        assert_eq!(history.len(), ERROR_HISTORY_DEPTH + 1);
        assert_eq!(history[0], ERROR_HISTORY_DEPTH as i64);
        assert_eq!(history[1] as u16, 0x1009);
    }

    #[test]
    fn mode_is_mirrored_and_range_checked() {
        let drive = drive();
        set_mode(&drive, OperationMode::Homing);
        assert_eq!(drive.value(od::MODE_OF_OPERATION_DISPLAY), Some(6));

        let err = drive
            .write_integer(&NODE, 5, od::MODE_OF_OPERATION, BitWidth::Bits8)
            .unwrap_err();
        assert!(matches!(err, RegisterError::Rejected { .. }));
        assert_eq!(drive.value(od::MODE_OF_OPERATION), Some(6));
    }

    #[test]
    fn homing_runs_for_the_configured_time() {
        let drive = drive();
        set_mode(&drive, OperationMode::Homing);
        assert_eq!(drive.status_word() & 0x3400, 0x0400);

        enable(&drive);
        write_control(&drive, 0x001F);
        assert_eq!(drive.status_word() & 0x3400, 0x0000);

        drive.advance(Duration::from_millis(1499));
        assert_eq!(drive.status_word() & 0x3400, 0x0000);
        drive.advance(Duration::from_millis(1));
        assert_eq!(drive.status_word() & 0x3400, 0x1400);
    }

    #[test]
    fn dropping_start_interrupts_homing() {
        let drive = drive();
        set_mode(&drive, OperationMode::Homing);
        enable(&drive);
        write_control(&drive, 0x001F);
        drive.advance(Duration::from_millis(100));

        write_control(&drive, 0x000F);
        assert_eq!(drive.status_word() & 0x3400, 0x0400);
    }

    #[test]
    fn failed_homing_reports_error_bit() {
        let drive = drive();
        drive.fail_next_homing();
        set_mode(&drive, OperationMode::Homing);
        enable(&drive);
        write_control(&drive, 0x001F);
        drive.advance(Duration::from_secs(2));
        assert_eq!(drive.status_word() & 0x3400, 0x2400);
    }

    #[test]
    fn profile_position_moves_at_profile_velocity() {
        let drive = drive();
        set_mode(&drive, OperationMode::ProfilePosition);
        drive
            .write_integer(&NODE, 1000, od::TARGET_POSITION, BitWidth::Bits32)
            .unwrap();
        enable(&drive);
        write_control(&drive, 0x003F);
        assert_eq!(drive.status_word() & 0x1400, 0x1000);

        drive.advance(Duration::from_secs(1));
        assert_eq!(drive.value(od::POSITION_ACTUAL), Some(200));
        assert_eq!(drive.value(od::VELOCITY_ACTUAL), Some(200));

        drive.advance(Duration::from_secs(4));
        assert_eq!(drive.value(od::POSITION_ACTUAL), Some(1000));
        assert_eq!(drive.status_word() & 0x0400, 0x0400);
    }

    #[test]
    fn relative_target_adds_to_actual_position() {
        let drive = drive();
        set_mode(&drive, OperationMode::ProfilePosition);
        drive
            .write_integer(&NODE, -50, od::TARGET_POSITION, BitWidth::Bits32)
            .unwrap();
        enable(&drive);
        write_control(&drive, 0x007F);
        drive.advance(Duration::from_secs(1));
        assert_eq!(drive.value(od::POSITION_ACTUAL), Some(-50));

        // A second strobe moves again.
        write_control(&drive, 0x006F);
        write_control(&drive, 0x007F);
        drive.advance(Duration::from_secs(1));
        assert_eq!(drive.value(od::POSITION_ACTUAL), Some(-100));
    }

    #[test]
    fn velocity_follows_acceleration_ramp() {
        let drive = drive();
        set_mode(&drive, OperationMode::Velocity);
        drive
            .write_integer(&NODE, 300, od::VL_TARGET_VELOCITY, BitWidth::Bits16)
            .unwrap();
        enable(&drive);
        assert_eq!(drive.value(od::VL_VELOCITY_DEMAND), Some(300));

        drive.advance(Duration::from_millis(200));
        assert_eq!(drive.value(od::VL_VELOCITY_ACTUAL), Some(100));
        drive.advance(Duration::from_secs(1));
        assert_eq!(drive.value(od::VL_VELOCITY_ACTUAL), Some(300));

        // Halt decelerates to zero.
        write_control(&drive, 0x010F);
        drive.advance(Duration::from_secs(1));
        assert_eq!(drive.value(od::VL_VELOCITY_ACTUAL), Some(0));
    }

    #[test]
    fn auto_setup_sets_bit_twelve_until_start_drops() {
        let drive = drive();
        set_mode(&drive, OperationMode::AutoSetup);
        enable(&drive);
        write_control(&drive, 0x001F);
        drive.advance(Duration::from_secs(2));
        assert_eq!(drive.status_word() & 0x1000, 0x1000);

        write_control(&drive, 0x0000);
        assert_eq!(drive.status_word() & 0x1000, 0);
        assert_eq!(drive.power_state(), PowerState::SwitchOnDisabled);
    }

    #[test]
    fn save_completes_after_save_time() {
        let drive = drive();
        let address = OdIndex::new(od::STORE_PARAMETERS, 3);
        drive
            .write_integer(&NODE, i64::from(SAVE_SIGNATURE), address, BitWidth::Bits32)
            .unwrap();
        assert_eq!(drive.read_integer(&NODE, address).unwrap(), 0);

        drive.advance(Duration::from_millis(200));
        assert_eq!(drive.read_integer(&NODE, address).unwrap(), 1);
        assert_eq!(drive.saved_groups(), vec![3]);
    }

    #[test]
    fn save_without_signature_is_refused() {
        let drive = drive();
        let address = OdIndex::new(od::STORE_PARAMETERS, 1);
        assert!(drive.write_integer(&NODE, 1, address, BitWidth::Bits32).is_err());
        assert_eq!(drive.value(address), Some(1));
        assert!(drive.saved_groups().is_empty());
    }

    #[test]
    fn other_nodes_and_lost_links_do_not_respond() {
        let drive = drive();
        assert!(matches!(
            drive.read_integer(&NodeId(2), od::STATUS_WORD),
            Err(RegisterError::Communication(_))
        ));

        drive.set_connected(false);
        assert!(matches!(
            drive.read_integer(&NODE, od::STATUS_WORD),
            Err(RegisterError::Communication(_))
        ));
    }

    #[test]
    fn power_cycle_keeps_parameters_and_boots() {
        let drive = drive();
        drive
            .write_integer(&NODE, 400, od::PROFILE_VELOCITY, BitWidth::Bits32)
            .unwrap();
        enable(&drive);

        drive.power_cycle();
        assert_eq!(drive.power_state(), PowerState::NotReadyToSwitchOn);
        assert_eq!(drive.value(od::PROFILE_VELOCITY), Some(400));
        assert_eq!(drive.value(od::CONTROL_WORD), Some(0));

        drive.advance(Duration::from_millis(50));
        assert_eq!(drive.power_state(), PowerState::SwitchOnDisabled);
    }

    #[test]
    fn snapshot_restores_into_a_fresh_drive() {
        let drive = drive();
        set_mode(&drive, OperationMode::Velocity);
        enable(&drive);
        drive.inject_fault(DeviceFault::from_raw(0x0201_3210));

        let snapshot = drive.snapshot();
        let restored = SimulatedDrive::new(SimulationConfig::default());
        restored.restore(&snapshot);

        assert_eq!(restored.power_state(), PowerState::Fault);
        assert_eq!(restored.value(od::MODE_OF_OPERATION_DISPLAY), Some(2));
        assert_eq!(
            restored.read_array(&NODE, od::ERROR_HISTORY).unwrap(),
            vec![1, 0x0201_3210]
        );
    }

    #[test]
    fn ramp_distance_is_bounded_below() {
        assert_eq!(distance(500, 1, Duration::from_millis(200)), 100);
        assert_eq!(distance(1, 1, Duration::from_millis(10)), 1);
        assert_eq!(distance(500, 0, Duration::from_millis(1)), i64::MAX);
        assert_eq!(distance(500, 1, Duration::ZERO), 0);
    }
}
