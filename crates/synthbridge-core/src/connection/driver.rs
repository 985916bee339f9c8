//! MIDI port driver abstraction.
//!
//! The connection manager only needs to enumerate port names, open ports by
//! name, drain pending input without blocking and write output. Anything that
//! can do that (midir, a test double) can drive the bridge.

use crate::error::Result;

/// Enumerates and opens MIDI ports.
pub trait MidiDriver {
    /// Names of the input ports currently present.
    fn input_names(&mut self) -> Result<Vec<String>>;

    /// Names of the output ports currently present.
    fn output_names(&mut self) -> Result<Vec<String>>;

    /// Open an input port. The port closes when the returned value is dropped.
    fn open_input(&mut self, name: &str) -> Result<Box<dyn MidiInputPort>>;

    /// Open an output port. The port closes when the returned value is dropped.
    fn open_output(&mut self, name: &str) -> Result<Box<dyn MidiOutputPort>>;
}

/// An open input port.
pub trait MidiInputPort {
    /// Take every message received since the last call. Never blocks.
    fn drain(&mut self) -> Vec<Vec<u8>>;
}

/// An open output port.
pub trait MidiOutputPort {
    /// Write one complete MIDI message.
    fn send(&mut self, bytes: &[u8]) -> Result<()>;
}

/// In-memory driver for tests.
#[cfg(test)]
pub(crate) mod fake {
    use super::*;
    use crate::error::Error;
    use std::cell::RefCell;
    use std::collections::{HashMap, HashSet, VecDeque};
    use std::rc::Rc;

    /// Shared state standing in for the platform MIDI subsystem.
    #[derive(Debug, Default)]
    pub struct FakeBus {
        pub inputs: Vec<String>,
        pub outputs: Vec<String>,
        pub pending: HashMap<String, VecDeque<Vec<u8>>>,
        pub sent: Vec<(String, Vec<u8>)>,
        pub refuse: HashSet<String>,
        pub open_inputs: HashSet<String>,
    }

    impl FakeBus {
        pub fn inject(&mut self, port: &str, bytes: &[u8]) {
            self.pending
                .entry(port.to_string())
                .or_default()
                .push_back(bytes.to_vec());
        }

        pub fn sent_to(&self, port: &str) -> Vec<Vec<u8>> {
            self.sent
                .iter()
                .filter(|(name, _)| name == port)
                .map(|(_, bytes)| bytes.clone())
                .collect()
        }
    }

    #[derive(Clone, Default)]
    pub struct FakeDriver {
        pub bus: Rc<RefCell<FakeBus>>,
    }

    impl FakeDriver {
        pub fn with_ports(inputs: &[&str], outputs: &[&str]) -> Self {
            let driver = Self::default();
            {
                let mut bus = driver.bus.borrow_mut();
                bus.inputs = inputs.iter().map(|s| s.to_string()).collect();
                bus.outputs = outputs.iter().map(|s| s.to_string()).collect();
            }
            driver
        }
    }

    impl MidiDriver for FakeDriver {
        fn input_names(&mut self) -> Result<Vec<String>> {
            Ok(self.bus.borrow().inputs.clone())
        }

        fn output_names(&mut self) -> Result<Vec<String>> {
            Ok(self.bus.borrow().outputs.clone())
        }

        fn open_input(&mut self, name: &str) -> Result<Box<dyn MidiInputPort>> {
            let mut bus = self.bus.borrow_mut();
            if bus.refuse.contains(name) || !bus.inputs.iter().any(|n| n == name) {
                return Err(Error::port(name, "refused"));
            }
            bus.open_inputs.insert(name.to_string());
            Ok(Box::new(FakeInput {
                name: name.to_string(),
                bus: self.bus.clone(),
            }))
        }

        fn open_output(&mut self, name: &str) -> Result<Box<dyn MidiOutputPort>> {
            let bus = self.bus.borrow();
            if bus.refuse.contains(name) || !bus.outputs.iter().any(|n| n == name) {
                return Err(Error::port(name, "refused"));
            }
            Ok(Box::new(FakeOutput {
                name: name.to_string(),
                bus: self.bus.clone(),
            }))
        }
    }

    struct FakeInput {
        name: String,
        bus: Rc<RefCell<FakeBus>>,
    }

    impl MidiInputPort for FakeInput {
        fn drain(&mut self) -> Vec<Vec<u8>> {
            self.bus
                .borrow_mut()
                .pending
                .remove(&self.name)
                .map(Vec::from)
                .unwrap_or_default()
        }
    }

    impl Drop for FakeInput {
        fn drop(&mut self) {
            self.bus.borrow_mut().open_inputs.remove(&self.name);
        }
    }

    struct FakeOutput {
        name: String,
        bus: Rc<RefCell<FakeBus>>,
    }

    impl MidiOutputPort for FakeOutput {
        fn send(&mut self, bytes: &[u8]) -> Result<()> {
            self.bus
                .borrow_mut()
                .sent
                .push((self.name.clone(), bytes.to_vec()));
            Ok(())
        }
    }
}
