//! MIDI message parsing and serialization.
//!
//! Channels are carried zero-based on the wire; the bridge configuration holds
//! the user-facing 1-16 number.

/// Bank select: 0 = user bank, anything else = factory bank.
pub const CC_BANK_SELECT: u8 = 0;
/// Mod wheel (performance controller, not part of the preset).
pub const CC_MOD_WHEEL: u8 = 1;
/// Selects which modulation source the shared amount CCs address.
pub const CC_MOD_SOURCE_SELECT: u8 = 30;
/// Sustain pedal (performance controller, not part of the preset).
pub const CC_SUSTAIN: u8 = 64;

pub const SYSEX_START: u8 = 0xF0;
pub const SYSEX_END: u8 = 0xF7;

/// MIDI message types parsed from raw MIDI bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MidiMessage {
    /// Note on event (channel 0-15, note 0-127, velocity 1-127)
    NoteOn { channel: u8, note: u8, velocity: u8 },
    /// Note off event (channel 0-15, note 0-127)
    NoteOff { channel: u8, note: u8 },
    /// Control change (channel, controller number, value)
    ControlChange { channel: u8, controller: u8, value: u8 },
    /// Program change
    ProgramChange { channel: u8, program: u8 },
    /// Channel aftertouch (channel pressure)
    ChannelAftertouch { channel: u8, pressure: u8 },
    /// Polyphonic aftertouch (per-note pressure)
    PolyAftertouch { channel: u8, note: u8, pressure: u8 },
    /// Pitch bend (channel, 14-bit value centered at 0)
    PitchBend { channel: u8, value: i16 },
    /// Complete system exclusive frame, including `F0` and `F7`
    SysEx(Vec<u8>),
}

impl MidiMessage {
    /// Parse raw MIDI bytes into a MidiMessage.
    ///
    /// Running status and system real-time bytes are not handled; the port
    /// drivers deliver one complete message per call.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let (&status, data) = bytes.split_first()?;

        if status == SYSEX_START {
            return match bytes.last() {
                Some(&SYSEX_END) if bytes.len() >= 2 => Some(MidiMessage::SysEx(bytes.to_vec())),
                _ => None,
            };
        }

        let msg_type = status & 0xF0;
        let channel = status & 0x0F;

        match (msg_type, data) {
            (0x90, [note, velocity, ..]) => {
                if *velocity == 0 {
                    // Note on with velocity 0 is treated as note off
                    Some(MidiMessage::NoteOff { channel, note: *note })
                } else {
                    Some(MidiMessage::NoteOn {
                        channel,
                        note: *note,
                        velocity: *velocity,
                    })
                }
            }
            (0x80, [note, _, ..]) => Some(MidiMessage::NoteOff { channel, note: *note }),
            (0xB0, [controller, value, ..]) => Some(MidiMessage::ControlChange {
                channel,
                controller: *controller,
                value: *value,
            }),
            (0xC0, [program, ..]) => Some(MidiMessage::ProgramChange {
                channel,
                program: *program,
            }),
            (0xD0, [pressure, ..]) => Some(MidiMessage::ChannelAftertouch {
                channel,
                pressure: *pressure,
            }),
            (0xA0, [note, pressure, ..]) => Some(MidiMessage::PolyAftertouch {
                channel,
                note: *note,
                pressure: *pressure,
            }),
            (0xE0, [lsb, msb, ..]) => {
                // Pitch bend is 14-bit: LSB + MSB
                let value = ((*msb as i16) << 7) | *lsb as i16;
                Some(MidiMessage::PitchBend {
                    channel,
                    value: value - 8192,
                })
            }
            _ => None,
        }
    }

    /// Convert to raw MIDI bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            MidiMessage::NoteOn { channel, note, velocity } => {
                vec![0x90 | (channel & 0x0F), note & 0x7F, velocity & 0x7F]
            }
            MidiMessage::NoteOff { channel, note } => vec![0x80 | (channel & 0x0F), note & 0x7F, 0],
            MidiMessage::ControlChange { channel, controller, value } => {
                vec![0xB0 | (channel & 0x0F), controller & 0x7F, value & 0x7F]
            }
            MidiMessage::ProgramChange { channel, program } => {
                vec![0xC0 | (channel & 0x0F), program & 0x7F]
            }
            MidiMessage::ChannelAftertouch { channel, pressure } => {
                vec![0xD0 | (channel & 0x0F), pressure & 0x7F]
            }
            MidiMessage::PolyAftertouch { channel, note, pressure } => {
                vec![0xA0 | (channel & 0x0F), note & 0x7F, pressure & 0x7F]
            }
            MidiMessage::PitchBend { channel, value } => {
                let raw = (i32::from(*value) + 8192).clamp(0, 0x3FFF) as u16;
                vec![0xE0 | (channel & 0x0F), (raw & 0x7F) as u8, (raw >> 7) as u8]
            }
            MidiMessage::SysEx(bytes) => bytes.clone(),
        }
    }

    /// Channel of a channel-voice message, `None` for SYSEX.
    pub fn channel(&self) -> Option<u8> {
        match self {
            MidiMessage::NoteOn { channel, .. }
            | MidiMessage::NoteOff { channel, .. }
            | MidiMessage::ControlChange { channel, .. }
            | MidiMessage::ProgramChange { channel, .. }
            | MidiMessage::ChannelAftertouch { channel, .. }
            | MidiMessage::PolyAftertouch { channel, .. }
            | MidiMessage::PitchBend { channel, .. } => Some(*channel),
            MidiMessage::SysEx(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_note_on() {
        let msg = MidiMessage::from_bytes(&[0x92, 60, 100]).unwrap();
        assert_eq!(
            msg,
            MidiMessage::NoteOn {
                channel: 2,
                note: 60,
                velocity: 100
            }
        );
    }

    #[test]
    fn test_parse_note_on_velocity_zero() {
        let msg = MidiMessage::from_bytes(&[0x90, 60, 0]).unwrap();
        assert_eq!(msg, MidiMessage::NoteOff { channel: 0, note: 60 });
    }

    #[test]
    fn test_parse_cc_and_program_change() {
        assert_eq!(
            MidiMessage::from_bytes(&[0xB0, 74, 64]),
            Some(MidiMessage::ControlChange {
                channel: 0,
                controller: 74,
                value: 64
            })
        );
        assert_eq!(
            MidiMessage::from_bytes(&[0xC5, 17]),
            Some(MidiMessage::ProgramChange {
                channel: 5,
                program: 17
            })
        );
    }

    #[test]
    fn test_parse_sysex_requires_terminator() {
        assert_eq!(
            MidiMessage::from_bytes(&[0xF0, 0x7D, 0xF7]),
            Some(MidiMessage::SysEx(vec![0xF0, 0x7D, 0xF7]))
        );
        assert_eq!(MidiMessage::from_bytes(&[0xF0, 0x7D]), None);
    }

    #[test]
    fn test_truncated_messages_rejected() {
        assert_eq!(MidiMessage::from_bytes(&[]), None);
        assert_eq!(MidiMessage::from_bytes(&[0xB0, 74]), None);
        assert_eq!(MidiMessage::from_bytes(&[0xC0]), None);
    }

    #[test]
    fn test_pitch_bend_center() {
        let msg = MidiMessage::from_bytes(&[0xE0, 0x00, 0x40]).unwrap();
        assert_eq!(msg, MidiMessage::PitchBend { channel: 0, value: 0 });
        assert_eq!(msg.to_bytes(), vec![0xE0, 0x00, 0x40]);
    }

    #[test]
    fn test_to_bytes() {
        let cc = MidiMessage::ControlChange {
            channel: 1,
            controller: 30,
            value: 2,
        };
        assert_eq!(cc.to_bytes(), vec![0xB1, 30, 2]);

        let at = MidiMessage::ChannelAftertouch {
            channel: 0,
            pressure: 90,
        };
        assert_eq!(at.to_bytes(), vec![0xD0, 90]);
    }
}
