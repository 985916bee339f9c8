//! OSC dispatch: control requests into bridge calls, notifications into OSC.
//!
//! ## Requests
//!
//! - `/param/<name> i|f|s` - set a parameter (a string sets an enum label)
//! - `/preset/load_slot s s i` - type (`user`/`factory`), bank letter, number
//! - `/preset/save_slot s s i`
//! - `/preset/load_file s`, `/preset/save_file s` - preset file path
//! - `/preset/request_dump`
//! - `/device/connect s s` - target input and output port names
//! - `/device/disconnect`
//! - `/port/{input,output}/{connect,disconnect} s`
//! - `/perf/{modwheel,aftertouch,sustain} i`

use anyhow::{anyhow, bail, Context, Result};
use rosc::{OscMessage, OscType};
use std::fs;
use synthbridge_core::{
    Bridge, Direction, ModSource, Notification, Performance, PresetType, SlotKey, Value,
};

/// Execute one control request against the bridge.
pub fn handle(bridge: &mut Bridge, msg: &OscMessage) -> Result<()> {
    log::debug!("[OSC] {} {:?}", msg.addr, msg.args);

    if let Some(name) = msg.addr.strip_prefix("/param/") {
        match arg(msg, 0)? {
            OscType::Int(v) => bridge.set_parameter(name, Value::Int(*v))?,
            OscType::Float(v) => bridge.set_parameter(name, Value::Float(*v))?,
            OscType::Double(v) => bridge.set_parameter(name, Value::Float(*v as f32))?,
            OscType::String(label) => bridge.set_parameter_label(name, label)?,
            other => bail!("{}: unsupported argument {:?}", msg.addr, other),
        };
        return Ok(());
    }

    match msg.addr.as_str() {
        "/preset/load_slot" => bridge.load_slot(slot_arg(msg)?)?,
        "/preset/save_slot" => bridge.save_current_to_slot(slot_arg(msg)?)?,
        "/preset/load_file" => {
            let path = str_arg(msg, 0)?;
            let bytes = fs::read(path).with_context(|| format!("Failed to read preset {}", path))?;
            bridge.load_file(&bytes)?;
            log::info!("[OSC] Loaded preset file {}", path);
        }
        "/preset/save_file" => {
            let path = str_arg(msg, 0)?;
            fs::write(path, bridge.save_to_file()?)
                .with_context(|| format!("Failed to write preset {}", path))?;
            log::info!("[OSC] Saved preset file {}", path);
        }
        "/preset/request_dump" => bridge.request_full_dump()?,
        "/device/connect" => bridge.connect_target(str_arg(msg, 0)?, str_arg(msg, 1)?)?,
        "/device/disconnect" => bridge.disconnect_target(),
        "/port/input/connect" => bridge.connect_generic_input(str_arg(msg, 0)?)?,
        "/port/input/disconnect" => bridge.disconnect_generic_input(str_arg(msg, 0)?),
        "/port/output/connect" => bridge.connect_generic_output(str_arg(msg, 0)?)?,
        "/port/output/disconnect" => bridge.disconnect_generic_output(str_arg(msg, 0)?),
        "/perf/modwheel" => bridge.set_mod_wheel(midi_arg(msg, 0)?),
        "/perf/aftertouch" => bridge.set_aftertouch(midi_arg(msg, 0)?),
        "/perf/sustain" => bridge.set_sustain(midi_arg(msg, 0)?),
        other => bail!("unknown address {}", other),
    }
    Ok(())
}

/// Reply sent when a request fails.
pub fn error_reply(msg: &OscMessage, error: &anyhow::Error) -> OscMessage {
    OscMessage {
        addr: "/error".into(),
        args: vec![
            OscType::String(msg.addr.clone()),
            OscType::String(format!("{:#}", error)),
        ],
    }
}

fn arg<'a>(msg: &'a OscMessage, index: usize) -> Result<&'a OscType> {
    msg.args
        .get(index)
        .ok_or_else(|| anyhow!("{}: missing argument {}", msg.addr, index + 1))
}

fn str_arg(msg: &OscMessage, index: usize) -> Result<&str> {
    match arg(msg, index)? {
        OscType::String(s) => Ok(s.as_str()),
        other => bail!("{}: expected a string, got {:?}", msg.addr, other),
    }
}

fn int_arg(msg: &OscMessage, index: usize) -> Result<i64> {
    match arg(msg, index)? {
        OscType::Int(v) => Ok(i64::from(*v)),
        OscType::Long(v) => Ok(*v),
        other => bail!("{}: expected an integer, got {:?}", msg.addr, other),
    }
}

/// A 7-bit controller value.
fn midi_arg(msg: &OscMessage, index: usize) -> Result<u8> {
    let value = int_arg(msg, index)?;
    u8::try_from(value)
        .ok()
        .filter(|v| *v <= 127)
        .ok_or_else(|| anyhow!("{}: {} not in 0..=127", msg.addr, value))
}

fn slot_arg(msg: &OscMessage) -> Result<SlotKey> {
    let preset_type: PresetType = str_arg(msg, 0)?.parse()?;
    let bank = str_arg(msg, 1)?;
    let mut letters = bank.chars();
    let (Some(letter), None) = (letters.next(), letters.next()) else {
        bail!("{}: bank must be a single letter, got '{}'", msg.addr, bank);
    };
    let number = u8::try_from(int_arg(msg, 2)?).unwrap_or(0);
    Ok(SlotKey::with_letter(preset_type, letter, number)?)
}

fn slot_args(key: &SlotKey) -> Vec<OscType> {
    vec![
        OscType::String(key.preset_type.to_string()),
        OscType::String(key.bank_letter().to_string()),
        OscType::Int(key.number() as i32),
    ]
}

fn port_args(name: &str, direction: Direction, target: bool) -> Vec<OscType> {
    vec![
        OscType::String(name.to_string()),
        OscType::String(direction.to_string()),
        OscType::Bool(target),
    ]
}

fn mod_source_args(source: ModSource) -> Vec<OscType> {
    vec![
        OscType::String(source.to_string()),
        OscType::Int(source.slot() as i32),
    ]
}

/// Map a bridge notification to its outbound OSC message.
pub fn notification_to_osc(notification: &Notification) -> OscMessage {
    let (addr, args): (String, Vec<OscType>) = match notification {
        Notification::ParameterChanged { name, value, label } => {
            let mut args = vec![match value {
                Value::Int(v) => OscType::Int(*v),
                Value::Float(v) => OscType::Float(*v),
            }];
            if let Some(label) = label {
                args.push(OscType::String(label.to_string()));
            }
            (format!("/param/{}", name), args)
        }
        Notification::PresetLoaded(key) => ("/preset/loaded".into(), slot_args(key)),
        Notification::DumpReceived(key) => ("/preset/dump_received".into(), slot_args(key)),
        Notification::UnsavedChanges(dirty) => ("/preset/unsaved".into(), vec![OscType::Bool(*dirty)]),
        Notification::DeviceConnected { input, output } => (
            "/device/connected".into(),
            vec![OscType::String(input.clone()), OscType::String(output.clone())],
        ),
        Notification::DeviceDisconnected => ("/device/disconnected".into(), vec![]),
        Notification::PortDetected {
            name,
            direction,
            target,
        } => ("/port/detected".into(), port_args(name, *direction, *target)),
        Notification::PortLost {
            name,
            direction,
            target,
        } => ("/port/lost".into(), port_args(name, *direction, *target)),
        Notification::PortConnected {
            name,
            direction,
            target,
        } => ("/port/connected".into(), port_args(name, *direction, *target)),
        Notification::PortDisconnected {
            name,
            direction,
            target,
        } => ("/port/disconnected".into(), port_args(name, *direction, *target)),
        Notification::PortError { name, reason } => (
            "/port/error".into(),
            vec![OscType::String(name.clone()), OscType::String(reason.clone())],
        ),
        Notification::FeedbackDetected { port, bytes } => (
            "/feedback".into(),
            vec![OscType::String(port.clone()), OscType::Blob(bytes.clone())],
        ),
        Notification::ModSourceChanged(source) => ("/mod/source".into(), mod_source_args(*source)),
        Notification::Performance(perf) => match *perf {
            Performance::ModWheel(v) => ("/perf/modwheel".into(), vec![OscType::Int(v.into())]),
            Performance::Sustain(v) => ("/perf/sustain".into(), vec![OscType::Int(v.into())]),
            Performance::Aftertouch(v) => ("/perf/aftertouch".into(), vec![OscType::Int(v.into())]),
            Performance::PolyAftertouch { note, pressure } => (
                "/perf/poly_aftertouch".into(),
                vec![OscType::Int(note.into()), OscType::Int(pressure.into())],
            ),
            Performance::NoteOn { note, velocity } => (
                "/perf/note_on".into(),
                vec![OscType::Int(note.into()), OscType::Int(velocity.into())],
            ),
        },
    };
    OscMessage { addr, args }
}

#[cfg(test)]
mod tests {
    use super::*;
    use synthbridge_core::{
        BridgeConfig, MidiDriver, MidiInputPort, MidiOutputPort, Registry, Snapshot,
    };

    /// A MIDI subsystem without any ports.
    struct NoPorts;

    impl MidiDriver for NoPorts {
        fn input_names(&mut self) -> synthbridge_core::Result<Vec<String>> {
            Ok(vec![])
        }

        fn output_names(&mut self) -> synthbridge_core::Result<Vec<String>> {
            Ok(vec![])
        }

        fn open_input(&mut self, name: &str) -> synthbridge_core::Result<Box<dyn MidiInputPort>> {
            Err(synthbridge_core::Error::PortUnavailable {
                name: name.into(),
                reason: "no ports".into(),
            })
        }

        fn open_output(&mut self, name: &str) -> synthbridge_core::Result<Box<dyn MidiOutputPort>> {
            Err(synthbridge_core::Error::PortUnavailable {
                name: name.into(),
                reason: "no ports".into(),
            })
        }
    }

    fn bridge() -> Bridge {
        Bridge::new(BridgeConfig::default(), Box::new(NoPorts), Snapshot::default()).0
    }

    fn msg(addr: &str, args: Vec<OscType>) -> OscMessage {
        OscMessage {
            addr: addr.into(),
            args,
        }
    }

    fn s(v: &str) -> OscType {
        OscType::String(v.into())
    }

    #[test]
    fn test_set_parameters() {
        let mut bridge = bridge();
        handle(&mut bridge, &msg("/param/lpf.cutoff.value", vec![OscType::Float(0.25)])).unwrap();
        handle(&mut bridge, &msg("/param/legato.value", vec![OscType::Int(1)])).unwrap();
        handle(&mut bridge, &msg("/param/voice.mode.value", vec![s("drone")])).unwrap();

        let store = bridge.store();
        assert_eq!(store.get("lpf.cutoff.value").unwrap(), Value::Float(0.25));
        assert_eq!(store.get("legato.value").unwrap(), Value::Int(1));
        assert_eq!(store.get("voice.mode.value").unwrap(), Value::Int(127));
    }

    #[test]
    fn test_invalid_requests_fail() {
        let mut bridge = bridge();
        let before = bridge.store().current_snapshot();
        for request in [
            msg("/param/lpf.cutoff.value", vec![OscType::Int(1)]),
            msg("/param/nope", vec![OscType::Int(1)]),
            msg("/param/legato.value", vec![]),
            msg("/preset/load_slot", vec![s("user"), s("A"), OscType::Int(1)]),
            msg("/preset/load_slot", vec![s("user"), s("AB"), OscType::Int(1)]),
            msg("/preset/save_slot", vec![s("factory"), s("C"), OscType::Int(4)]),
            msg("/perf/modwheel", vec![OscType::Int(300)]),
            msg("/device/connect", vec![s("a"), s("b")]),
            msg("/nothing/here", vec![]),
        ] {
            assert!(handle(&mut bridge, &request).is_err(), "{} should fail", request.addr);
        }
        assert_eq!(bridge.store().current_snapshot(), before);
    }

    #[test]
    fn test_preset_file_requests() {
        let mut bridge = bridge();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pad.json");
        let path_arg = s(path.to_str().unwrap());

        handle(&mut bridge, &msg("/param/env.release.value", vec![OscType::Float(0.7)])).unwrap();
        handle(&mut bridge, &msg("/preset/save_file", vec![path_arg.clone()])).unwrap();
        handle(&mut bridge, &msg("/param/env.release.value", vec![OscType::Float(0.1)])).unwrap();
        handle(&mut bridge, &msg("/preset/load_file", vec![path_arg])).unwrap();

        assert_eq!(
            bridge.store().get("env.release.value").unwrap(),
            Value::Float(0.7)
        );
    }

    #[test]
    fn test_error_reply() {
        let request = msg("/param/nope", vec![OscType::Int(1)]);
        let error = anyhow!("Unknown parameter: nope");
        let reply = error_reply(&request, &error);
        assert_eq!(reply.addr, "/error");
        assert_eq!(reply.args, vec![s("/param/nope"), s("Unknown parameter: nope")]);
    }

    #[test]
    fn test_notification_mapping() {
        let key = SlotKey::with_letter(PresetType::Factory, 'C', 4).unwrap();
        let loaded = notification_to_osc(&Notification::PresetLoaded(key));
        assert_eq!(loaded.addr, "/preset/loaded");
        assert_eq!(loaded.args, vec![s("factory"), s("C"), OscType::Int(4)]);

        let mode = Registry::global().resolve_by_name("voice.mode.value").unwrap();
        let changed = notification_to_osc(&Notification::ParameterChanged {
            name: mode.name.clone(),
            value: Value::Int(51),
            label: mode.label_for(Value::Int(51)),
        });
        assert_eq!(changed.addr, "/param/voice.mode.value");
        assert_eq!(changed.args, vec![OscType::Int(51), s("unison")]);

        let source = notification_to_osc(&Notification::ModSourceChanged(ModSource::Velocity));
        assert_eq!(source.args, vec![s("velocity"), OscType::Int(2)]);

        let port = notification_to_osc(&Notification::PortLost {
            name: "Keystation 49".into(),
            direction: Direction::In,
            target: false,
        });
        assert_eq!(port.addr, "/port/lost");
        assert_eq!(port.args, vec![s("Keystation 49"), s("input"), OscType::Bool(false)]);
    }
}
