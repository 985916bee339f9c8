//! [`MidiDriver`] backed by midir (ALSA, CoreMIDI, WinMM).
//!
//! midir delivers input on its own callback thread; the callback pushes each
//! message onto a channel that the bridge drains once per tick.

use super::driver::{MidiDriver, MidiInputPort, MidiOutputPort};
use crate::error::{Error, Result};
use crossbeam_channel::{unbounded, Receiver};
use midir::{Ignore, MidiInput, MidiInputConnection, MidiOutput, MidiOutputConnection};

/// Port enumeration and connection through midir.
pub struct MidirDriver {
    client_name: String,
    scan_in: MidiInput,
    scan_out: MidiOutput,
}

impl MidirDriver {
    /// Create the clients used for enumeration.
    pub fn new(client_name: &str) -> Result<Self> {
        let scan_in = MidiInput::new(&format!("{}-scan-in", client_name))
            .map_err(|e| Error::port("midi input", e))?;
        let scan_out = MidiOutput::new(&format!("{}-scan-out", client_name))
            .map_err(|e| Error::port("midi output", e))?;
        Ok(Self {
            client_name: client_name.to_string(),
            scan_in,
            scan_out,
        })
    }
}

impl MidiDriver for MidirDriver {
    fn input_names(&mut self) -> Result<Vec<String>> {
        Ok(self
            .scan_in
            .ports()
            .iter()
            .filter_map(|p| self.scan_in.port_name(p).ok())
            .collect())
    }

    fn output_names(&mut self) -> Result<Vec<String>> {
        Ok(self
            .scan_out
            .ports()
            .iter()
            .filter_map(|p| self.scan_out.port_name(p).ok())
            .collect())
    }

    fn open_input(&mut self, name: &str) -> Result<Box<dyn MidiInputPort>> {
        let mut midi_in = MidiInput::new(&self.client_name).map_err(|e| Error::port(name, e))?;
        // SYSEX must come through; clock and active sensing are noise here.
        midi_in.ignore(Ignore::TimeAndActiveSense);

        let port = midi_in
            .ports()
            .into_iter()
            .find(|p| midi_in.port_name(p).map_or(false, |n| n == name))
            .ok_or_else(|| Error::port(name, "no longer present"))?;

        let (tx, rx) = unbounded();
        let connection = midi_in
            .connect(
                &port,
                &format!("{}-in", self.client_name),
                move |_timestamp, bytes, _| {
                    log::debug!("[MIDI RAW] {:02X?}", bytes);
                    let _ = tx.send(bytes.to_vec());
                },
                (),
            )
            .map_err(|e| Error::port(name, e))?;

        log::info!("[MIDI] Opened input '{}'", name);
        Ok(Box::new(MidirInput {
            _connection: connection,
            rx,
        }))
    }

    fn open_output(&mut self, name: &str) -> Result<Box<dyn MidiOutputPort>> {
        let midi_out = MidiOutput::new(&self.client_name).map_err(|e| Error::port(name, e))?;

        let port = midi_out
            .ports()
            .into_iter()
            .find(|p| midi_out.port_name(p).map_or(false, |n| n == name))
            .ok_or_else(|| Error::port(name, "no longer present"))?;

        let connection = midi_out
            .connect(&port, &format!("{}-out", self.client_name))
            .map_err(|e| Error::port(name, e))?;

        log::info!("[MIDI] Opened output '{}'", name);
        Ok(Box::new(MidirOutput {
            name: name.to_string(),
            connection,
        }))
    }
}

struct MidirInput {
    /// Keeps the midir callback alive
    _connection: MidiInputConnection<()>,
    rx: Receiver<Vec<u8>>,
}

impl MidiInputPort for MidirInput {
    fn drain(&mut self) -> Vec<Vec<u8>> {
        self.rx.try_iter().collect()
    }
}

struct MidirOutput {
    name: String,
    connection: MidiOutputConnection,
}

impl MidiOutputPort for MidirOutput {
    fn send(&mut self, bytes: &[u8]) -> Result<()> {
        self.connection
            .send(bytes)
            .map_err(|e| Error::port(&self.name, e))
    }
}
