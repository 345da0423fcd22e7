use serde::Serialize;

use crate::mask::{Mask, MASK_WIDTH};
use super::{DeviceType, Direction, IoBank};

// Usable pins per (device, bank)
const PICO_GPIO: u8 = 8;
const COMPACT_GPIO: u8 = 14;
const COMPACT_OUTPUTS: u8 = 32;
const COMPACT_INPUTS: u8 = 24;

/// Label shown for pins that are not connected
pub const NC_LABEL: &str = "NC";

/// Derived description of one bit position of a bank
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PinDescriptor {
    pub index: u8,
    pub label: String,
    pub usable: bool,
    pub direction: Direction,
    /// True when the UI shows a direction glyph (usable GPIO pins only)
    pub indicator: bool,
}

/// Number of leading bit positions wired to a physical pin
pub fn usable_pin_count(device_type: DeviceType, bank: IoBank) -> u8 {
    match (device_type, bank) {
        (DeviceType::PicoController, IoBank::Gpio) => PICO_GPIO,
        (DeviceType::CompactController, IoBank::Gpio) => COMPACT_GPIO,
        (DeviceType::CompactController, IoBank::Outputs) => COMPACT_OUTPUTS,
        (DeviceType::CompactController, IoBank::Inputs) => COMPACT_INPUTS,
        _ => 0,
    }
}

/// Classify a single bit position. Total over every index, including ones past the mask width.
pub fn classify(device_type: DeviceType, bank: IoBank, index: u8) -> PinDescriptor {
    let usable = index < usable_pin_count(device_type, bank);
    PinDescriptor {
        index,
        label: if usable { index.to_string() } else { NC_LABEL.to_string() },
        usable,
        direction: bank.direction(),
        indicator: usable && bank == IoBank::Gpio,
    }
}

/// All 32 descriptors of a bank, in bit order
pub fn bank_layout(device_type: DeviceType, bank: IoBank) -> Vec<PinDescriptor> {
    (0..MASK_WIDTH).map(|index| classify(device_type, bank, index)).collect()
}

/// One pin as handed to the presentation layer
#[derive(Debug, Clone, Serialize)]
pub struct PinView {
    #[serde(flatten)]
    pub descriptor: PinDescriptor,
    /// Pin is usable and its bit is high
    pub lit: bool,
}

/// Render input for one bank panel
#[derive(Debug, Clone, Serialize)]
pub struct BankView {
    pub bank: IoBank,
    pub mask: Mask,
    /// Clicks on usable pins of this bank are wired to toggles
    pub interactive: bool,
    pub pins: Vec<PinView>,
}

impl BankView {
    pub fn new(device_type: DeviceType, bank: IoBank, mask: Mask) -> Self {
        let pins = bank_layout(device_type, bank)
            .into_iter()
            .map(|descriptor| {
                let lit = descriptor.usable && mask.test(descriptor.index);
                PinView { descriptor, lit }
            })
            .collect();

        Self {
            bank,
            mask,
            interactive: bank.output_bank().is_some(),
            pins,
        }
    }
}

/// Views for a controller panel: GPIO shows the read-back half, then dedicated outputs and inputs.
/// Galvo controllers have no digital banks and get no views.
pub fn controller_views(device_type: DeviceType, out: [Mask; 2], inputs: [Mask; 2]) -> Vec<BankView> {
    if !device_type.has_digital_banks() {
        return Vec::new();
    }
    vec![
        BankView::new(device_type, IoBank::Gpio, inputs[0]),
        BankView::new(device_type, IoBank::Outputs, out[1]),
        BankView::new(device_type, IoBank::Inputs, inputs[1]),
    ]
}
