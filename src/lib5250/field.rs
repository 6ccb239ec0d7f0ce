//! Input and output fields of the 5250 format table
//!
//! A field is a run of `length` cells starting at (`start_row`,
//! `start_col`) and wrapping at the display width. Its behaviour is
//! governed by the Field Format Word (FFW) and optionally a Field Control
//! Word (FCW) supplied by the Start Of Field order.

use std::fmt;

/// FFW bits
pub const FFW_BYPASS: u16 = 0x2000;
pub const FFW_DUP_ENABLE: u16 = 0x1000;
pub const FFW_MODIFIED: u16 = 0x0800;
pub const FFW_TYPE_MASK: u16 = 0x0700;
pub const FFW_AUTO_ENTER: u16 = 0x0080;
pub const FFW_FER: u16 = 0x0040;
pub const FFW_MONOCASE: u16 = 0x0020;
pub const FFW_MANDATORY: u16 = 0x0008;
pub const FFW_ADJUST_MASK: u16 = 0x0007;

/// FCW values
pub const FCW_HILIGHTED_ENTRY: u16 = 0x8900;
pub const FCW_CONTINUED: u16 = 0x8600;

/// Data type selected by bits 5-7 of the first FFW byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    AlphaShift,
    AlphaOnly,
    NumericShift,
    NumericOnly,
    Katakana,
    DigitsOnly,
    MagReader,
    SignedNumeric,
}

impl FieldType {
    pub fn from_ffw(ffw: u16) -> Self {
        match ffw & FFW_TYPE_MASK {
            0x0000 => FieldType::AlphaShift,
            0x0100 => FieldType::AlphaOnly,
            0x0200 => FieldType::NumericShift,
            0x0300 => FieldType::NumericOnly,
            0x0400 => FieldType::Katakana,
            0x0500 => FieldType::DigitsOnly,
            0x0600 => FieldType::MagReader,
            _ => FieldType::SignedNumeric,
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            FieldType::AlphaShift => "Alpha Shift",
            FieldType::AlphaOnly => "Alpha Only",
            FieldType::NumericShift => "Numeric Shift",
            FieldType::NumericOnly => "Numeric Only",
            FieldType::Katakana => "Katakana",
            FieldType::DigitsOnly => "Digits Only",
            FieldType::MagReader => "Mag Reader I/O Field",
            FieldType::SignedNumeric => "Signed Numeric",
        }
    }
}

/// Right-adjust / mandatory fill mode, low three bits of the FFW
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdjustMode {
    NoAdjust,
    Reserved(u8),
    RightZeroFill,
    RightBlankFill,
    MandatoryFill,
}

impl AdjustMode {
    pub fn from_ffw(ffw: u16) -> Self {
        match (ffw & FFW_ADJUST_MASK) as u8 {
            0 => AdjustMode::NoAdjust,
            5 => AdjustMode::RightZeroFill,
            6 => AdjustMode::RightBlankFill,
            7 => AdjustMode::MandatoryFill,
            n => AdjustMode::Reserved(n),
        }
    }
}

/// One entry of the format table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub id: usize,
    pub ffw: u16,
    pub fcw: u16,
    pub attribute: u8,
    pub start_row: usize,
    pub start_col: usize,
    pub length: usize,
    /// Width of the display the field was laid out on
    width: usize,
}

impl Field {
    pub fn new(width: usize) -> Self {
        Self {
            id: 0,
            ffw: 0,
            fcw: 0,
            attribute: 0,
            start_row: 0,
            start_col: 0,
            length: 0,
            width,
        }
    }

    /// Field at (`row`, `col`) with the given format word and length.
    pub fn with_layout(width: usize, row: usize, col: usize, length: usize, ffw: u16) -> Self {
        Self {
            ffw,
            start_row: row,
            start_col: col,
            length,
            ..Self::new(width)
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn start_pos(&self) -> usize {
        self.start_row * self.width + self.start_col
    }

    /// Buffer offset of the last cell. Only meaningful for non-empty fields.
    pub fn end_pos(&self) -> usize {
        (self.start_pos() + self.length).saturating_sub(1)
    }

    pub fn end_row(&self) -> usize {
        self.end_pos() / self.width
    }

    pub fn end_col(&self) -> usize {
        self.end_pos() % self.width
    }

    /// Whether (`y`, `x`) lies inside the field.
    pub fn hit_test(&self, y: usize, x: usize) -> bool {
        let pos = y * self.width + x;
        self.length > 0 && pos >= self.start_pos() && pos <= self.end_pos()
    }

    /// Cells between the field start and (`y`, `x`). The position must be
    /// inside the field.
    pub fn count_left(&self, y: usize, x: usize) -> usize {
        debug_assert!(self.hit_test(y, x));
        (y * self.width + x).saturating_sub(self.start_pos())
    }

    /// Cells between (`y`, `x`) and the field end. The position must be
    /// inside the field.
    pub fn count_right(&self, y: usize, x: usize) -> usize {
        debug_assert!(self.hit_test(y, x));
        self.end_pos().saturating_sub(y * self.width + x)
    }

    pub fn field_type(&self) -> FieldType {
        FieldType::from_ffw(self.ffw)
    }

    pub fn adjust(&self) -> AdjustMode {
        AdjustMode::from_ffw(self.ffw)
    }

    pub fn mdt(&self) -> bool {
        self.ffw & FFW_MODIFIED != 0
    }

    pub fn set_mdt(&mut self) {
        self.ffw |= FFW_MODIFIED;
    }

    pub fn clear_mdt(&mut self) {
        self.ffw &= !FFW_MODIFIED;
    }

    pub fn is_bypass(&self) -> bool {
        self.ffw & FFW_BYPASS != 0
    }

    pub fn is_dup_enable(&self) -> bool {
        self.ffw & FFW_DUP_ENABLE != 0
    }

    pub fn is_auto_enter(&self) -> bool {
        self.ffw & FFW_AUTO_ENTER != 0
    }

    pub fn is_fer(&self) -> bool {
        self.ffw & FFW_FER != 0
    }

    pub fn is_monocase(&self) -> bool {
        self.ffw & FFW_MONOCASE != 0
    }

    pub fn is_mandatory(&self) -> bool {
        self.ffw & FFW_MANDATORY != 0
    }

    pub fn is_signed_num(&self) -> bool {
        self.field_type() == FieldType::SignedNumeric
    }

    pub fn is_num_only(&self) -> bool {
        self.field_type() == FieldType::NumericOnly
    }

    /// Whether local character `ch` may be typed into this field.
    pub fn valid_char(&self, ch: u8) -> bool {
        match self.field_type() {
            FieldType::AlphaShift | FieldType::NumericShift | FieldType::Katakana | FieldType::MagReader => true,
            FieldType::AlphaOnly => ch.is_ascii_alphabetic() || matches!(ch, b',' | b'.' | b'-' | b' '),
            FieldType::NumericOnly => ch.is_ascii_digit() || matches!(ch, b'+' | b',' | b'.' | b'-' | b' '),
            FieldType::DigitsOnly => ch.is_ascii_digit(),
            FieldType::SignedNumeric => ch.is_ascii_digit() || matches!(ch, b'+' | b'-'),
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "field {} at ({}, {}) length {} ffw 0x{:04X} fcw 0x{:04X} attr 0x{:02X} [{}",
            self.id,
            self.start_row,
            self.start_col,
            self.length,
            self.ffw,
            self.fcw,
            self.attribute,
            self.field_type().description()
        )?;
        for (bit, name) in [
            (FFW_BYPASS, "bypass"),
            (FFW_DUP_ENABLE, "dup"),
            (FFW_MODIFIED, "mdt"),
            (FFW_AUTO_ENTER, "auto-enter"),
            (FFW_FER, "fer"),
            (FFW_MONOCASE, "monocase"),
            (FFW_MANDATORY, "mandatory"),
        ] {
            if self.ffw & bit != 0 {
                write!(f, ", {}", name)?;
            }
        }
        write!(f, "]")
    }
}
