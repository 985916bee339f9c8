//! MIDI port discovery and connection tracking.
//!
//! The [`ConnectionManager`] polls the platform port list, classifies each
//! port as the target synthesizer or a generic instrument by name, and keeps
//! the open ports plus one outbound FIFO per connected output.
//!
//! Nothing here blocks: inputs are drained, outputs are queued and flushed by
//! the bridge tick.

pub mod driver;
#[cfg(feature = "native")]
pub mod midir_driver;

pub use driver::{MidiDriver, MidiInputPort, MidiOutputPort};
#[cfg(feature = "native")]
pub use midir_driver::MidirDriver;

use crate::error::Result;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt;

/// Port direction, seen from the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Direction {
    In,
    Out,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::In => f.write_str("input"),
            Direction::Out => f.write_str("output"),
        }
    }
}

/// Bookkeeping for one enumerated port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionRecord {
    pub name: String,
    pub direction: Direction,
    pub is_target_device: bool,
    pub connected: bool,
}

/// Port lifecycle events, collected until [`ConnectionManager::take_events`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortEvent {
    Detected {
        name: String,
        direction: Direction,
        target: bool,
    },
    NoLongerDetected {
        name: String,
        direction: Direction,
        target: bool,
    },
    Connected {
        name: String,
        direction: Direction,
        target: bool,
    },
    Disconnected {
        name: String,
        direction: Direction,
        target: bool,
    },
    ConnectFailed {
        name: String,
        direction: Direction,
        reason: String,
    },
}

/// A message read from a connected input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inbound {
    pub port: String,
    pub from_target: bool,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct TargetPorts {
    input: String,
    output: String,
}

struct OpenOutput {
    port: Box<dyn MidiOutputPort>,
    queue: VecDeque<Vec<u8>>,
}

/// Tracks enumerated ports and owns the open ones.
pub struct ConnectionManager {
    driver: Box<dyn MidiDriver>,
    /// Lowercased name fragment identifying the target synthesizer
    device_match: String,
    records: BTreeMap<(Direction, String), ConnectionRecord>,
    inputs: BTreeMap<String, Box<dyn MidiInputPort>>,
    outputs: BTreeMap<String, OpenOutput>,
    target: Option<TargetPorts>,
    events: Vec<PortEvent>,
}

impl ConnectionManager {
    pub fn new(driver: Box<dyn MidiDriver>, device_match: &str) -> Self {
        Self {
            driver,
            device_match: device_match.to_lowercase(),
            records: BTreeMap::new(),
            inputs: BTreeMap::new(),
            outputs: BTreeMap::new(),
            target: None,
            events: Vec::new(),
        }
    }

    /// Case-insensitive substring match against the device name fragment.
    pub fn is_target_name(&self, name: &str) -> bool {
        !self.device_match.is_empty() && name.to_lowercase().contains(&self.device_match)
    }

    /// Re-enumerate ports and emit detection changes.
    ///
    /// A connected port that disappeared is disconnected before its
    /// `NoLongerDetected` event.
    pub fn poll(&mut self) {
        let inputs = match self.driver.input_names() {
            Ok(names) => names,
            Err(e) => {
                log::warn!("[MIDI] Failed to enumerate inputs: {}", e);
                return;
            }
        };
        let outputs = match self.driver.output_names() {
            Ok(names) => names,
            Err(e) => {
                log::warn!("[MIDI] Failed to enumerate outputs: {}", e);
                return;
            }
        };
        self.diff(Direction::In, inputs);
        self.diff(Direction::Out, outputs);
    }

    fn diff(&mut self, direction: Direction, names: Vec<String>) {
        let present: BTreeSet<String> = names.into_iter().collect();

        let lost: Vec<String> = self
            .records
            .keys()
            .filter(|(d, name)| *d == direction && !present.contains(name))
            .map(|(_, name)| name.clone())
            .collect();
        for name in lost {
            self.disconnect(direction, &name);
            if let Some(record) = self.records.remove(&(direction, name.clone())) {
                log::info!("[MIDI] {} '{}' no longer detected", direction, name);
                self.events.push(PortEvent::NoLongerDetected {
                    name,
                    direction,
                    target: record.is_target_device,
                });
            }
        }

        for name in present {
            self.detect(direction, &name);
        }
    }

    /// Record a port the first time it is seen.
    fn detect(&mut self, direction: Direction, name: &str) -> &mut ConnectionRecord {
        let target = self.is_target_name(name);
        let events = &mut self.events;
        self.records
            .entry((direction, name.to_string()))
            .or_insert_with(|| {
                log::info!(
                    "[MIDI] Detected {} '{}'{}",
                    direction,
                    name,
                    if target { " (target device)" } else { "" }
                );
                events.push(PortEvent::Detected {
                    name: name.to_string(),
                    direction,
                    target,
                });
                ConnectionRecord {
                    name: name.to_string(),
                    direction,
                    is_target_device: target,
                    connected: false,
                }
            })
    }

    /// Currently detected port names for one of the four classes.
    pub fn detected(&self, direction: Direction, target: bool) -> Vec<&str> {
        self.records
            .values()
            .filter(|r| r.direction == direction && r.is_target_device == target)
            .map(|r| r.name.as_str())
            .collect()
    }

    pub fn records(&self) -> impl Iterator<Item = &ConnectionRecord> {
        self.records.values()
    }

    pub fn is_connected(&self, direction: Direction, name: &str) -> bool {
        match direction {
            Direction::In => self.inputs.contains_key(name),
            Direction::Out => self.outputs.contains_key(name),
        }
    }

    /// Connect a generic port. Connecting an open port is a no-op.
    pub fn connect(&mut self, direction: Direction, name: &str) -> Result<()> {
        if self.is_connected(direction, name) {
            return Ok(());
        }
        if let Err(e) = self.open(direction, name) {
            log::error!("[MIDI] Failed to open {} '{}': {}", direction, name, e);
            self.events.push(PortEvent::ConnectFailed {
                name: name.to_string(),
                direction,
                reason: e.to_string(),
            });
            return Err(e);
        }
        self.events.push(PortEvent::Connected {
            name: name.to_string(),
            direction,
            target: false,
        });
        Ok(())
    }

    /// Disconnect a port. Disconnecting either target port drops the target.
    pub fn disconnect(&mut self, direction: Direction, name: &str) {
        if self.is_target_port(direction, name) {
            self.disconnect_target();
            return;
        }
        if self.close(direction, name) {
            log::info!("[MIDI] Disconnected {} '{}'", direction, name);
            self.events.push(PortEvent::Disconnected {
                name: name.to_string(),
                direction,
                target: false,
            });
        }
    }

    /// Open the target synthesizer's input and output together.
    ///
    /// An existing target connection to different ports is dropped first. If
    /// either port fails to open, neither stays open.
    pub fn connect_target(&mut self, input: &str, output: &str) -> Result<()> {
        if let Some(current) = &self.target {
            if current.input == input && current.output == output {
                return Ok(());
            }
            self.disconnect_target();
        }
        // Ports previously opened as generic are taken over by the target.
        self.disconnect(Direction::In, input);
        self.disconnect(Direction::Out, output);

        for (direction, name) in [(Direction::In, input), (Direction::Out, output)] {
            if let Err(e) = self.open(direction, name) {
                log::error!("[MIDI] Failed to open target {} '{}': {}", direction, name, e);
                self.close(Direction::In, input);
                self.events.push(PortEvent::ConnectFailed {
                    name: name.to_string(),
                    direction,
                    reason: e.to_string(),
                });
                return Err(e);
            }
        }

        self.target = Some(TargetPorts {
            input: input.to_string(),
            output: output.to_string(),
        });
        for (direction, name) in [(Direction::In, input), (Direction::Out, output)] {
            self.events.push(PortEvent::Connected {
                name: name.to_string(),
                direction,
                target: true,
            });
        }
        log::info!("[MIDI] Target connected: in '{}', out '{}'", input, output);
        Ok(())
    }

    /// Close both target ports, if connected.
    pub fn disconnect_target(&mut self) {
        let Some(target) = self.target.take() else {
            return;
        };
        self.close(Direction::In, &target.input);
        self.close(Direction::Out, &target.output);
        for (direction, name) in [(Direction::In, target.input), (Direction::Out, target.output)] {
            self.events.push(PortEvent::Disconnected {
                name,
                direction,
                target: true,
            });
        }
        log::info!("[MIDI] Target disconnected");
    }

    pub fn is_target_connected(&self) -> bool {
        self.target.is_some()
    }

    /// Names of the connected target `(input, output)`.
    pub fn target(&self) -> Option<(&str, &str)> {
        self.target
            .as_ref()
            .map(|t| (t.input.as_str(), t.output.as_str()))
    }

    fn is_target_port(&self, direction: Direction, name: &str) -> bool {
        self.target.as_ref().is_some_and(|t| match direction {
            Direction::In => t.input == name,
            Direction::Out => t.output == name,
        })
    }

    fn open(&mut self, direction: Direction, name: &str) -> Result<()> {
        match direction {
            Direction::In => {
                let port = self.driver.open_input(name)?;
                self.inputs.insert(name.to_string(), port);
            }
            Direction::Out => {
                let port = self.driver.open_output(name)?;
                self.outputs.insert(
                    name.to_string(),
                    OpenOutput {
                        port,
                        queue: VecDeque::new(),
                    },
                );
            }
        }
        self.detect(direction, name).connected = true;
        Ok(())
    }

    /// Close a port. Returns whether it was open.
    fn close(&mut self, direction: Direction, name: &str) -> bool {
        let was_open = match direction {
            Direction::In => self.inputs.remove(name).is_some(),
            Direction::Out => self.outputs.remove(name).is_some(),
        };
        if let Some(record) = self.records.get_mut(&(direction, name.to_string())) {
            record.connected = false;
        }
        was_open
    }

    /// Queue a message on a connected output. Returns false if not connected.
    pub fn enqueue(&mut self, output: &str, bytes: Vec<u8>) -> bool {
        match self.outputs.get_mut(output) {
            Some(open) => {
                open.queue.push_back(bytes);
                true
            }
            None => false,
        }
    }

    /// Connected outputs that are not the target's.
    pub fn generic_outputs(&self) -> Vec<String> {
        let target_out = self.target.as_ref().map(|t| t.output.as_str());
        self.outputs
            .keys()
            .filter(|name| Some(name.as_str()) != target_out)
            .cloned()
            .collect()
    }

    /// Drain every connected input.
    pub fn drain_inbound(&mut self) -> Vec<Inbound> {
        let target_in = self.target.as_ref().map(|t| t.input.clone());
        let mut messages = Vec::new();
        for (name, port) in self.inputs.iter_mut() {
            let from_target = target_in.as_deref() == Some(name.as_str());
            for bytes in port.drain() {
                messages.push(Inbound {
                    port: name.clone(),
                    from_target,
                    bytes,
                });
            }
        }
        messages
    }

    /// Write out every queued message, in FIFO order per port.
    pub fn flush_outbound(&mut self) {
        for (name, open) in self.outputs.iter_mut() {
            while let Some(bytes) = open.queue.pop_front() {
                if let Err(e) = open.port.send(&bytes) {
                    log::error!("[MIDI] Send to '{}' failed: {}", name, e);
                }
            }
        }
    }

    /// Take the events collected since the last call.
    pub fn take_events(&mut self) -> Vec<PortEvent> {
        std::mem::take(&mut self.events)
    }
}
