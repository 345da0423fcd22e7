use manual_control_lib::mask::{self, Mask};
use manual_control_lib::pins::{classify, DeviceType, IoBank, OutputBank};
use manual_control_lib::protocol::{AckChannel, Inbound, ManualCommand, Outbound};
use manual_control_lib::session::{ManualControlSession, RecordingLink, SessionPhase, UserIntent};
use serde_json::json;

fn zero_status() -> serde_json::Value {
    json!({"deviceType": "C", "out": {"mask_0": 0, "mask_1": 0}, "in": {"mask_0": 0, "mask_1": 0}})
}

#[test]
fn test_bit_31_round_trip() {
    let m = mask::set(Mask::EMPTY, 31);
    assert!(mask::test(m, 31));
    assert_eq!(u32::from(m), 2147483648);
    assert_eq!(mask::toggle(mask::toggle(m, 31), 31), m);
}

#[test]
fn test_classifier_boundaries() {
    assert!(classify(DeviceType::PicoController, IoBank::Gpio, 7).usable);
    assert!(!classify(DeviceType::PicoController, IoBank::Gpio, 8).usable);
    assert!(classify(DeviceType::CompactController, IoBank::Inputs, 23).usable);
    assert!(!classify(DeviceType::CompactController, IoBank::Inputs, 24).usable);
}

#[test]
fn test_toggle_then_ko_keeps_optimistic_mask() {
    let mut session = ManualControlSession::new(DeviceType::CompactController, 3, RecordingLink::new());
    session.attach();
    session.handle_inbound(Inbound::Status(zero_status()));
    assert_eq!(session.phase(), SessionPhase::Connected);
    session.link_mut().take_sent();

    assert!(session.handle_intent(UserIntent::Toggle { bank: OutputBank::Gpio, bit: 3 }).is_none());
    assert_eq!(session.out_masks().unwrap()[0].bits(), 8);
    assert_eq!(
        session.link().sent,
        vec![Outbound::Manual(ManualCommand::Digital { gpio: Mask::new(8), output: Mask::new(0) })]
    );
    assert_eq!(
        session.link().sent[0].payload(),
        Some(json!({"gpio": 8, "output": 0}))
    );

    let note = session
        .handle_inbound(Inbound::Ack(AckChannel::ManualCommand, Some(json!({"status": "KO", "info": "busy"}))))
        .expect("ack produces a notification");
    assert!(!note.success);
    assert_eq!(note.message, "busy");
    assert_eq!(session.out_masks().unwrap()[0].bits(), 8);
}

#[test]
fn test_galvo_move_outside_manual_mode_emits_nothing() {
    let mut session = ManualControlSession::new(DeviceType::GalvoController, 5, RecordingLink::new());
    session.attach();
    session.handle_inbound(Inbound::Status(json!({"deviceType": "G", "mode": "auto"})));
    session.link_mut().take_sent();

    let note = session
        .handle_intent(UserIntent::GalvoMove { channel: 0, position: 1000 })
        .expect("rejection notification");
    assert!(!note.success);
    assert_eq!(note.message, "Galvo mode must be 'Man'");
    assert!(session.link().sent.is_empty());
}

#[test]
fn test_views_follow_snapshot() {
    let mut session = ManualControlSession::new(DeviceType::PicoController, 8, RecordingLink::new());
    session.attach();
    session.handle_inbound(Inbound::Status(json!({
        "out": {"mask_0": 1, "mask_1": 0},
        "in": {"mask_0": 255, "mask_1": 0}
    })));

    let views = session.views();
    let gpio = &views[0];
    assert_eq!(gpio.bank, IoBank::Gpio);
    let lit: Vec<u8> = gpio.pins.iter().filter(|p| p.lit).map(|p| p.descriptor.index).collect();
    assert_eq!(lit, (0..8).collect::<Vec<u8>>());
    assert!(views[1].pins.iter().all(|p| p.descriptor.label == "NC"));
}
