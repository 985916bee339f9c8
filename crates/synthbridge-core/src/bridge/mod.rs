//! The protocol bridge.
//!
//! [`Bridge`] owns the preset store and the connection manager and advances
//! every timed behaviour from a single [`Bridge::update`] tick. One tick runs,
//! in order:
//!
//! 1. port enumeration (every `port_poll`) and connection bookkeeping
//! 2. inbound drain and message handling
//! 3. deadline evaluation (preset windows, scheduled loads, snapshot flush)
//! 4. outbound flush
//!
//! so a message that closes a window is always seen before that window's
//! timeout fires. State changes are reported on a crossbeam channel of
//! [`Notification`]s.

pub mod config;
pub mod feedback;
pub mod notification;

pub use config::{BridgeConfig, Timing};
pub use feedback::FeedbackGuard;
pub use notification::{Notification, Performance};

use crate::connection::{ConnectionManager, Direction, Inbound, MidiDriver, PortEvent};
use crate::error::{Error, Result};
use crate::midi::{
    MidiMessage, CC_BANK_SELECT, CC_MOD_SOURCE_SELECT, CC_MOD_WHEEL, CC_SUSTAIN,
};
use crate::preset::codec;
use crate::preset::file;
use crate::preset::store::PresetStore;
use crate::preset::{ImportKind, PresetType, SlotKey, Snapshot};
use crate::registry::{Descriptor, ModSource, Registry, Value};
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::time::Instant;

/// Bridges a hardware synthesizer, generic MIDI gear and a dispatch layer.
pub struct Bridge {
    config: BridgeConfig,
    connections: ConnectionManager,
    store: PresetStore,
    feedback: FeedbackGuard,
    notify_tx: Sender<Notification>,

    /// Source column addressed by shared modulation CCs
    mod_source: ModSource,
    /// Memory half the next Program-Change refers to
    bank_select: PresetType,
    /// Last loaded or saved memory slot
    current_preset: Option<SlotKey>,
    /// Target ports as of the last bookkeeping pass
    target: Option<(String, String)>,
    unsaved_reported: bool,

    /// Time of the current tick
    now: Instant,
    next_port_poll: Instant,
    awaiting_preset_until: Option<Instant>,
    ignore_cc_until: Option<Instant>,
    flush_due: Option<Instant>,
    init_load_at: Option<Instant>,
    dump_request_at: Option<Instant>,
}

impl Bridge {
    /// Create a bridge whose current snapshot is `initial`.
    ///
    /// Returns the receiving end of the notification stream.
    pub fn new(
        config: BridgeConfig,
        driver: Box<dyn MidiDriver>,
        initial: Snapshot,
    ) -> (Self, Receiver<Notification>) {
        let (notify_tx, notify_rx) = unbounded();
        let now = Instant::now();
        let bridge = Self {
            connections: ConnectionManager::new(driver, &config.device_match),
            feedback: FeedbackGuard::new(config.timing.feedback_window),
            store: PresetStore::new(initial),
            config,
            notify_tx,
            mod_source: ModSource::default(),
            bank_select: PresetType::User,
            current_preset: None,
            target: None,
            unsaved_reported: false,
            now,
            next_port_poll: now,
            awaiting_preset_until: None,
            ignore_cc_until: None,
            flush_due: None,
            init_load_at: None,
            dump_request_at: None,
        };
        (bridge, notify_rx)
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn store(&self) -> &PresetStore {
        &self.store
    }

    pub fn connections(&self) -> &ConnectionManager {
        &self.connections
    }

    pub fn mod_source(&self) -> ModSource {
        self.mod_source
    }

    pub fn current_preset(&self) -> Option<SlotKey> {
        self.current_preset
    }

    pub fn is_connected(&self) -> bool {
        self.target.is_some()
    }

    pub fn is_awaiting_preset(&self) -> bool {
        self.awaiting_preset_until.is_some()
    }

    pub fn is_ignoring_cc(&self) -> bool {
        self.ignore_cc_until.is_some()
    }

    /// Run one tick against the wall clock.
    pub fn update(&mut self) {
        self.update_at(Instant::now());
    }

    /// Run one tick at `now`.
    pub fn update_at(&mut self, now: Instant) {
        self.now = now;

        if now >= self.next_port_poll {
            self.next_port_poll = now + self.config.timing.port_poll;
            self.connections.poll();
        }
        self.process_port_events();

        for message in self.connections.drain_inbound() {
            self.handle_inbound(message);
        }

        self.fire_timers();
        self.report_unsaved();
        self.connections.flush_outbound();
    }

    // ========================================================================
    // Dispatch requests
    // ========================================================================

    /// Set a parameter on the current snapshot and send it to the hardware.
    ///
    /// Returns whether the value changed. Invalid requests leave the store
    /// untouched.
    pub fn set_parameter(&mut self, name: &str, value: Value) -> Result<bool> {
        let descriptor = Registry::global().resolve_by_name(name)?;
        let changed = self.store.set(name, value)?;
        if changed {
            self.transmit_parameter(descriptor, value);
            self.notify_parameter(descriptor, value);
        }
        Ok(changed)
    }

    /// Set an enum-alias parameter by label.
    pub fn set_parameter_label(&mut self, name: &str, label: &str) -> Result<bool> {
        let value = Registry::global()
            .resolve_by_name(name)?
            .value_for_label(label)?;
        self.set_parameter(name, value)
    }

    /// Make a cached memory slot the current snapshot.
    pub fn load_slot(&mut self, key: SlotKey) -> Result<()> {
        let snapshot = self.store.slot(&key).cloned().ok_or(Error::EmptySlot(key))?;
        log::info!("[BRIDGE] Loading {}", key);
        self.store.load_snapshot_as_current(snapshot);
        self.current_preset = Some(key);
        self.notify(Notification::PresetLoaded(key));
        self.notify_all_parameters();
        self.schedule_flush();
        Ok(())
    }

    /// Store the current snapshot into a memory slot of the target.
    pub fn save_current_to_slot(&mut self, key: SlotKey) -> Result<()> {
        if !self.connections.is_target_connected() {
            return Err(Error::port(&self.config.device_match, "target device not connected"));
        }
        log::info!("[BRIDGE] Saving current preset to {}", key);
        let frame = codec::encode_for_slot(self.store.current(), ImportKind::Persistent, key);
        self.send_to_target(frame);
        let snapshot = self.store.current_snapshot();
        self.store.record_slot_dump(key, snapshot);
        self.store.mark_clean();
        self.current_preset = Some(key);
        Ok(())
    }

    /// Replace the current snapshot with the contents of a preset file.
    pub fn load_file(&mut self, bytes: &[u8]) -> Result<()> {
        let snapshot = file::from_bytes(bytes)?;
        self.store.load_snapshot_as_current(snapshot);
        self.notify_all_parameters();
        self.schedule_flush();
        Ok(())
    }

    /// Serialize the current snapshot as a preset file.
    pub fn save_to_file(&self) -> Result<Vec<u8>> {
        file::to_bytes(self.store.current())
    }

    /// Ask the target for a persistent dump of every memory slot.
    pub fn request_full_dump(&mut self) -> Result<()> {
        if !self.connections.is_target_connected() {
            return Err(Error::port(&self.config.device_match, "target device not connected"));
        }
        log::info!("[BRIDGE] Requesting full preset dump");
        self.send_to_target(codec::dump_request());
        Ok(())
    }

    pub fn connect_target(&mut self, input: &str, output: &str) -> Result<()> {
        let result = self.connections.connect_target(input, output);
        self.process_port_events();
        result
    }

    pub fn disconnect_target(&mut self) {
        self.connections.disconnect_target();
        self.process_port_events();
    }

    pub fn connect_generic_input(&mut self, name: &str) -> Result<()> {
        let result = self.connections.connect(Direction::In, name);
        self.process_port_events();
        result
    }

    pub fn disconnect_generic_input(&mut self, name: &str) {
        self.connections.disconnect(Direction::In, name);
        self.process_port_events();
    }

    pub fn connect_generic_output(&mut self, name: &str) -> Result<()> {
        let result = self.connections.connect(Direction::Out, name);
        self.process_port_events();
        result
    }

    pub fn disconnect_generic_output(&mut self, name: &str) {
        self.connections.disconnect(Direction::Out, name);
        self.process_port_events();
    }

    pub fn set_mod_wheel(&mut self, value: u8) {
        self.send_performance(MidiMessage::ControlChange {
            channel: self.config.wire_channel(),
            controller: CC_MOD_WHEEL,
            value,
        });
    }

    pub fn set_sustain(&mut self, value: u8) {
        self.send_performance(MidiMessage::ControlChange {
            channel: self.config.wire_channel(),
            controller: CC_SUSTAIN,
            value,
        });
    }

    pub fn set_aftertouch(&mut self, value: u8) {
        self.send_performance(MidiMessage::ChannelAftertouch {
            channel: self.config.wire_channel(),
            pressure: value,
        });
    }

    fn send_performance(&mut self, message: MidiMessage) {
        if !self.send_to_target(message.to_bytes()) {
            log::debug!("[BRIDGE] No target connected, dropped {:?}", message);
        }
    }

    // ========================================================================
    // Connection bookkeeping
    // ========================================================================

    fn process_port_events(&mut self) {
        let mut target_detected = false;
        for event in self.connections.take_events() {
            let notification = match event {
                PortEvent::Detected {
                    name,
                    direction,
                    target,
                } => {
                    target_detected |= target;
                    Notification::PortDetected {
                        name,
                        direction,
                        target,
                    }
                }
                PortEvent::NoLongerDetected {
                    name,
                    direction,
                    target,
                } => Notification::PortLost {
                    name,
                    direction,
                    target,
                },
                PortEvent::Connected {
                    name,
                    direction,
                    target,
                } => Notification::PortConnected {
                    name,
                    direction,
                    target,
                },
                PortEvent::Disconnected {
                    name,
                    direction,
                    target,
                } => Notification::PortDisconnected {
                    name,
                    direction,
                    target,
                },
                PortEvent::ConnectFailed { name, reason, .. } => {
                    Notification::PortError { name, reason }
                }
            };
            self.notify(notification);
        }

        self.sync_target_state();

        if target_detected && self.config.auto_connect && self.target.is_none() {
            self.auto_connect();
        }
    }

    /// Apply connect/disconnect transitions of the target device.
    fn sync_target_state(&mut self) {
        let current = self
            .connections
            .target()
            .map(|(input, output)| (input.to_string(), output.to_string()));
        if current == self.target {
            return;
        }

        if self.target.take().is_some() {
            log::info!("[BRIDGE] Device disconnected, clearing slot cache");
            self.store.clear_slots();
            self.init_load_at = None;
            self.dump_request_at = None;
            self.awaiting_preset_until = None;
            self.ignore_cc_until = None;
            self.notify(Notification::DeviceDisconnected);
        }

        if let Some((input, output)) = current {
            log::info!("[BRIDGE] Device connected (in '{}', out '{}')", input, output);
            let timing = &self.config.timing;
            self.init_load_at = Some(self.now + timing.connect_load);
            self.dump_request_at = Some(self.now + timing.connect_load + timing.dump_request);
            self.notify(Notification::DeviceConnected {
                input: input.clone(),
                output: output.clone(),
            });
            self.target = Some((input, output));
        }
    }

    fn auto_connect(&mut self) {
        let input = self.connections.detected(Direction::In, true).first().map(|s| s.to_string());
        let output = self.connections.detected(Direction::Out, true).first().map(|s| s.to_string());
        let (Some(input), Some(output)) = (input, output) else {
            return;
        };
        log::info!("[BRIDGE] Auto-connecting to '{}' / '{}'", input, output);
        if let Err(e) = self.connections.connect_target(&input, &output) {
            log::warn!("[BRIDGE] Auto-connect failed: {}", e);
        }
        self.process_port_events();
    }

    // ========================================================================
    // Inbound handling
    // ========================================================================

    fn handle_inbound(&mut self, inbound: Inbound) {
        log::debug!("[MIDI] {} <- {:02X?}", inbound.port, inbound.bytes);

        if !inbound.from_target && self.feedback.is_echo(&inbound.bytes, self.now) {
            log::debug!("[BRIDGE] Dropped echo from '{}'", inbound.port);
            self.notify(Notification::FeedbackDetected {
                port: inbound.port,
                bytes: inbound.bytes,
            });
            return;
        }

        match MidiMessage::from_bytes(&inbound.bytes) {
            Some(MidiMessage::SysEx(frame)) => self.handle_sysex(&frame),
            Some(other) if other.channel() == Some(self.config.wire_channel()) => {
                self.handle_channel_message(&other, inbound.from_target)
            }
            Some(_) => log::debug!("[BRIDGE] Ignoring message on another channel"),
            None => log::debug!("[BRIDGE] Not interpreting {:02X?}", inbound.bytes),
        }

        if inbound.from_target {
            self.send_to_generic_outputs(&inbound.bytes);
        } else {
            self.send_to_target(inbound.bytes);
        }
    }

    fn handle_channel_message(&mut self, message: &MidiMessage, from_target: bool) {
        match *message {
            MidiMessage::ControlChange {
                controller, value, ..
            } => self.handle_cc(controller, value, from_target),
            MidiMessage::ProgramChange { program, .. } if from_target => {
                self.handle_program_change(program)
            }
            // The synthesizer answers a forwarded program change itself.
            MidiMessage::ProgramChange { program, .. } => {
                log::debug!("[BRIDGE] Forwarding program change {} to device", program)
            }
            MidiMessage::NoteOn { note, velocity, .. } => {
                self.notify(Notification::Performance(Performance::NoteOn { note, velocity }))
            }
            MidiMessage::ChannelAftertouch { pressure, .. } => {
                self.notify(Notification::Performance(Performance::Aftertouch(pressure)))
            }
            MidiMessage::PolyAftertouch { note, pressure, .. } => self.notify(
                Notification::Performance(Performance::PolyAftertouch { note, pressure }),
            ),
            _ => {}
        }
    }

    fn handle_cc(&mut self, controller: u8, value: u8, from_target: bool) {
        match controller {
            CC_BANK_SELECT => {
                self.bank_select = PresetType::from_bank_select(value);
                log::debug!("[BRIDGE] Bank select: {}", self.bank_select);
            }
            CC_MOD_SOURCE_SELECT => {
                self.mod_source = ModSource::from_cc_value(value);
                log::debug!("[BRIDGE] Modulation source: {}", self.mod_source);
                self.notify(Notification::ModSourceChanged(self.mod_source));
            }
            CC_MOD_WHEEL => self.notify(Notification::Performance(Performance::ModWheel(value))),
            CC_SUSTAIN => self.notify(Notification::Performance(Performance::Sustain(value))),
            _ if from_target && self.ignore_cc_until.is_some() => {
                log::debug!("[BRIDGE] CC {} dropped after preset SYSEX", controller);
            }
            _ => self.apply_cc(controller, value),
        }
    }

    fn apply_cc(&mut self, controller: u8, cc_value: u8) {
        let Some(descriptor) = Registry::global()
            .resolve_by_cc(controller, self.mod_source)
            .into_iter()
            .next()
        else {
            log::debug!("[BRIDGE] Unmapped CC {}", controller);
            return;
        };

        let awaiting = self.awaiting_preset_until.is_some();
        let stored = self.store.current().value_at(descriptor.index);
        // The stored value may carry more precision than 7 bits; keep it
        // when the CC only repeats it.
        let value = if descriptor.value_to_cc(stored) == cc_value {
            if !awaiting {
                return;
            }
            stored
        } else {
            let value = descriptor.value_from_cc(cc_value);
            if let Err(e) = self.store.set(&descriptor.name, value) {
                log::warn!("[BRIDGE] Rejected CC {}: {}", controller, e);
                return;
            }
            value
        };

        if awaiting {
            self.store.mark_clean();
        }
        self.notify_parameter(descriptor, value);
    }

    fn handle_program_change(&mut self, program: u8) {
        match SlotKey::from_program(self.bank_select, program) {
            Ok(key) => {
                log::info!("[BRIDGE] Program change to {}", key);
                self.current_preset = Some(key);
                self.awaiting_preset_until = Some(self.now + self.config.timing.awaiting_preset);
                self.store.mark_clean();
                self.notify(Notification::PresetLoaded(key));
            }
            Err(e) => log::warn!("[BRIDGE] Ignoring program change {}: {}", program, e),
        }
    }

    fn handle_sysex(&mut self, frame: &[u8]) {
        if !codec::is_device_sysex(frame) {
            log::debug!("[BRIDGE] Ignoring foreign SYSEX");
            return;
        }
        if codec::is_dump_request(frame) {
            return;
        }

        let decoded = match codec::decode(frame) {
            Ok(decoded) => decoded,
            Err(e) => {
                log::warn!("[BRIDGE] Dropped preset SYSEX: {}", e);
                return;
            }
        };

        match decoded.import_kind {
            ImportKind::NonPersistent => {
                log::info!("[BRIDGE] Edit buffer received ({})", decoded.slot);
                self.store.load_snapshot_as_current(decoded.snapshot);
                self.current_preset = Some(decoded.slot);
                self.awaiting_preset_until = None;
                self.ignore_cc_until = Some(self.now + self.config.timing.ignore_cc);
                self.notify_all_parameters();
            }
            ImportKind::Persistent => {
                log::info!("[BRIDGE] Slot dump received for {}", decoded.slot);
                self.store.record_slot_dump(decoded.slot, decoded.snapshot);
                self.notify(Notification::DumpReceived(decoded.slot));
            }
        }
    }

    // ========================================================================
    // Timers
    // ========================================================================

    fn fire_timers(&mut self) {
        let now = self.now;
        let due = |deadline: &mut Option<Instant>| -> bool {
            if deadline.is_some_and(|at| now >= at) {
                *deadline = None;
                true
            } else {
                false
            }
        };

        if due(&mut self.awaiting_preset_until) {
            log::debug!("[BRIDGE] No preset data followed the program change");
        }
        due(&mut self.ignore_cc_until);

        if due(&mut self.init_load_at) && self.target.is_some() {
            log::info!("[BRIDGE] Sending current preset to device");
            let slot = self.current_preset.unwrap_or(SlotKey::FIRST_USER);
            let frame = codec::encode_for_slot(self.store.current(), ImportKind::NonPersistent, slot);
            self.send_to_target(frame);
            self.notify_all_parameters();
        }

        if due(&mut self.dump_request_at) && self.target.is_some() {
            log::info!("[BRIDGE] Requesting full preset dump");
            self.send_to_target(codec::dump_request());
        }

        if due(&mut self.flush_due) {
            self.flush_snapshot();
        }
    }

    fn schedule_flush(&mut self) {
        if self.flush_due.is_none() {
            self.flush_due = Some(self.now + self.config.timing.flush_interval);
        }
    }

    fn flush_snapshot(&mut self) {
        let slot = self.current_preset.unwrap_or(SlotKey::FIRST_USER);
        let frame = codec::encode_for_slot(self.store.current(), ImportKind::NonPersistent, slot);
        log::debug!("[BRIDGE] Flushing snapshot ({} bytes)", frame.len());
        self.send_to_generic_outputs(&frame);
        self.send_to_target(frame);
    }

    // ========================================================================
    // Outbound
    // ========================================================================

    fn transmit_parameter(&mut self, descriptor: &Descriptor, value: Value) {
        if descriptor.needs_snapshot_flush() {
            self.schedule_flush();
            return;
        }
        if let Some(cc) = descriptor.direct_cc() {
            let bytes = MidiMessage::ControlChange {
                channel: self.config.wire_channel(),
                controller: cc,
                value: descriptor.value_to_cc(value),
            }
            .to_bytes();
            self.send_to_generic_outputs(&bytes);
            self.send_to_target(bytes);
        }
    }

    /// Queue a message for the target. Returns false if no target is connected.
    fn send_to_target(&mut self, bytes: Vec<u8>) -> bool {
        let Some((_, output)) = self.connections.target() else {
            return false;
        };
        let output = output.to_string();
        self.connections.enqueue(&output, bytes)
    }

    /// Queue a message for every generic output and remember it as a
    /// potential echo.
    fn send_to_generic_outputs(&mut self, bytes: &[u8]) {
        let outputs = self.connections.generic_outputs();
        if outputs.is_empty() {
            return;
        }
        self.feedback.record(bytes, self.now);
        for output in outputs {
            self.connections.enqueue(&output, bytes.to_vec());
        }
    }

    // ========================================================================
    // Notifications
    // ========================================================================

    fn notify(&self, notification: Notification) {
        // The receiver is gone only while the host shuts down.
        let _ = self.notify_tx.send(notification);
    }

    fn notify_parameter(&self, descriptor: &Descriptor, value: Value) {
        self.notify(Notification::ParameterChanged {
            name: descriptor.name.clone(),
            value,
            label: descriptor.label_for(value),
        });
    }

    fn notify_all_parameters(&self) {
        for (descriptor, value) in self.store.current().iter() {
            self.notify_parameter(descriptor, value);
        }
    }

    fn report_unsaved(&mut self) {
        let dirty = self.store.is_dirty();
        if dirty != self.unsaved_reported {
            self.unsaved_reported = dirty;
            self.notify(Notification::UnsavedChanges(dirty));
        }
    }
}
