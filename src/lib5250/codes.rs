//! 5250 data stream constants
//!
//! Command codes, Write To Display orders, AID codes, control characters
//! and record header values.

/// Escape byte that precedes every command in a record
pub const ESC: u8 = 0x04;

/// 5250 Protocol Commands
pub const CMD_WRITE_TO_DISPLAY: u8 = 0x11;
pub const CMD_CLEAR_UNIT: u8 = 0x40;
pub const CMD_CLEAR_UNIT_ALTERNATE: u8 = 0x20;
pub const CMD_CLEAR_FORMAT_TABLE: u8 = 0x50;
pub const CMD_READ_MDT_FIELDS: u8 = 0x52;
pub const CMD_READ_MDT_FIELDS_ALT: u8 = 0x82;
pub const CMD_READ_IMMEDIATE: u8 = 0x72;
pub const CMD_READ_IMMEDIATE_ALT: u8 = 0x83;
pub const CMD_READ_SCREEN_IMMEDIATE: u8 = 0x62;
pub const CMD_WRITE_STRUCTURED_FIELD: u8 = 0xF3;
pub const CMD_SAVE_SCREEN: u8 = 0x02;
pub const CMD_RESTORE_SCREEN: u8 = 0x12;
pub const CMD_SAVE_PARTIAL_SCREEN: u8 = 0x03;
pub const CMD_RESTORE_PARTIAL_SCREEN: u8 = 0x13;
pub const CMD_WRITE_ERROR_CODE: u8 = 0x21;
pub const CMD_WRITE_ERROR_CODE_WINDOW: u8 = 0x22;
pub const CMD_READ_INPUT_FIELDS: u8 = 0x42;
pub const CMD_ROLL: u8 = 0x23;

/// 5250 Protocol Orders
pub const SOH: u8 = 0x01; // Start of header
pub const RA: u8 = 0x02; // Repeat to address
pub const EA: u8 = 0x03; // Erase to address
pub const WEA: u8 = 0x12; // Write extended attribute (not supported)
pub const TD: u8 = 0x10; // Transparent data
pub const SBA: u8 = 0x11; // Set buffer address
pub const IC: u8 = 0x13; // Insert cursor
pub const MC: u8 = 0x14; // Move cursor
pub const SF: u8 = 0x1D; // Start of field

/// Attention identifiers
pub const AID_F1: u8 = 0x31;
pub const AID_F2: u8 = 0x32;
pub const AID_F3: u8 = 0x33;
pub const AID_F4: u8 = 0x34;
pub const AID_F5: u8 = 0x35;
pub const AID_F6: u8 = 0x36;
pub const AID_F7: u8 = 0x37;
pub const AID_F8: u8 = 0x38;
pub const AID_F9: u8 = 0x39;
pub const AID_F10: u8 = 0x3A;
pub const AID_F11: u8 = 0x3B;
pub const AID_F12: u8 = 0x3C;
pub const AID_F13: u8 = 0xB1;
pub const AID_F14: u8 = 0xB2;
pub const AID_F15: u8 = 0xB3;
pub const AID_F16: u8 = 0xB4;
pub const AID_F17: u8 = 0xB5;
pub const AID_F18: u8 = 0xB6;
pub const AID_F19: u8 = 0xB7;
pub const AID_F20: u8 = 0xB8;
pub const AID_F21: u8 = 0xB9;
pub const AID_F22: u8 = 0xBA;
pub const AID_F23: u8 = 0xBB;
pub const AID_F24: u8 = 0xBC;
pub const AID_CLEAR: u8 = 0xBD;
pub const AID_ENTER: u8 = 0xF1;
pub const AID_HELP: u8 = 0xF3;
pub const AID_ROLL_DOWN: u8 = 0xF4;
pub const AID_ROLL_UP: u8 = 0xF5;
pub const AID_PRINT: u8 = 0xF6;
pub const AID_RECORD_BS: u8 = 0xF8;

/// AID code for function key `n` (1..=24)
pub fn aid_for_function_key(n: u8) -> Option<u8> {
    match n {
        1..=12 => Some(AID_F1 + n - 1),
        13..=24 => Some(AID_F13 + n - 13),
        _ => None,
    }
}

/// Write To Display control character 1 (keyboard lock / MDT reset)
pub const CC1_MASK: u8 = 0xE0;
pub const CC1_NO_LOCK: u8 = 0x00;
pub const CC1_LOCK: u8 = 0x20;
pub const CC1_RESET_NON_BYPASS_MDT: u8 = 0x40;
pub const CC1_RESET_ALL_MDT: u8 = 0x60;
pub const CC1_NULL_NON_BYPASS_MDT: u8 = 0x80;
pub const CC1_RESET_MDT_NULL_NON_BYPASS: u8 = 0xA0;
pub const CC1_RESET_MDT_NULL_NON_BYPASS_MDT: u8 = 0xC0;
pub const CC1_RESET_MDT_NULL_ALL_NON_BYPASS: u8 = 0xE0;

/// Write To Display control character 2
pub const CC2_IC_ULOCK: u8 = 0x02;
pub const CC2_CLR_BLINK: u8 = 0x04;
pub const CC2_SET_BLINK: u8 = 0x08;
pub const CC2_UNLOCK: u8 = 0x10;
pub const CC2_ALARM: u8 = 0x20;
pub const CC2_MESSAGE_OFF: u8 = 0x40;
pub const CC2_MESSAGE_ON: u8 = 0x80;

/// Record header: GDS record type following the length
pub const RECORD_TYPE: [u8; 2] = [0x12, 0xA0];
/// Variable header length sent on every outbound record
pub const RECORD_VAR_HEADER_LEN: u8 = 4;
/// Fixed + variable header size
pub const RECORD_HEADER_LEN: usize = 10;

/// Flow type of display records
pub const FLOW_DISPLAY: u16 = 0x00;

/// Record header flags
pub const H_NONE: u8 = 0;
pub const H_ERR: u8 = 0x80;
pub const H_ATN: u8 = 0x40;
pub const H_PRINTER_READY: u8 = 0x20;
pub const H_FIRST_OF_CHAIN: u8 = 0x10;
pub const H_LAST_OF_CHAIN: u8 = 0x08;
pub const H_SRQ: u8 = 0x04;
pub const H_TRQ: u8 = 0x02;
pub const H_HLP: u8 = 0x01;

/// Record opcodes
pub const OPCODE_NO_OP: u8 = 0;
pub const OPCODE_INVITE: u8 = 1;
pub const OPCODE_OUTPUT_ONLY: u8 = 2;
pub const OPCODE_PUT_GET: u8 = 3;
pub const OPCODE_SAVE_SCR: u8 = 4;
pub const OPCODE_RESTORE_SCR: u8 = 5;
pub const OPCODE_READ_IMMED: u8 = 6;
pub const OPCODE_READ_SCR: u8 = 8;
pub const OPCODE_CANCEL_INVITE: u8 = 10;
pub const OPCODE_MESSAGE_ON: u8 = 11;
pub const OPCODE_MESSAGE_OFF: u8 = 12;

/// Field Attributes
/// C.f. 5494 Functions Reference (SC30-3533-04), Section 15.6.12.3.
/// Bits 0-2 always set to 001 to identify as an attribute byte.
pub const ATTR_5250_GREEN: u8 = 0x20;
pub const ATTR_5250_NORMAL: u8 = ATTR_5250_GREEN;

/// Enum representation of 5250 protocol commands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandCode {
    WriteToDisplay,
    ClearUnit,
    ClearUnitAlternate,
    ClearFormatTable,
    ReadMdtFields,
    ReadMdtFieldsAlt,
    ReadImmediate,
    ReadImmediateAlt,
    ReadScreenImmediate,
    WriteStructuredField,
    SaveScreen,
    SavePartialScreen,
    RestoreScreen,
    RestorePartialScreen,
    WriteErrorCode,
    WriteErrorCodeWindow,
    ReadInputFields,
    Roll,
}

impl CommandCode {
    /// Convert a byte value to a CommandCode enum
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            CMD_WRITE_TO_DISPLAY => Some(Self::WriteToDisplay),
            CMD_CLEAR_UNIT => Some(Self::ClearUnit),
            CMD_CLEAR_UNIT_ALTERNATE => Some(Self::ClearUnitAlternate),
            CMD_CLEAR_FORMAT_TABLE => Some(Self::ClearFormatTable),
            CMD_READ_MDT_FIELDS => Some(Self::ReadMdtFields),
            CMD_READ_MDT_FIELDS_ALT => Some(Self::ReadMdtFieldsAlt),
            CMD_READ_IMMEDIATE => Some(Self::ReadImmediate),
            CMD_READ_IMMEDIATE_ALT => Some(Self::ReadImmediateAlt),
            CMD_READ_SCREEN_IMMEDIATE => Some(Self::ReadScreenImmediate),
            CMD_WRITE_STRUCTURED_FIELD => Some(Self::WriteStructuredField),
            CMD_SAVE_SCREEN => Some(Self::SaveScreen),
            CMD_SAVE_PARTIAL_SCREEN => Some(Self::SavePartialScreen),
            CMD_RESTORE_SCREEN => Some(Self::RestoreScreen),
            CMD_RESTORE_PARTIAL_SCREEN => Some(Self::RestorePartialScreen),
            CMD_WRITE_ERROR_CODE => Some(Self::WriteErrorCode),
            CMD_WRITE_ERROR_CODE_WINDOW => Some(Self::WriteErrorCodeWindow),
            CMD_READ_INPUT_FIELDS => Some(Self::ReadInputFields),
            CMD_ROLL => Some(Self::Roll),
            _ => None,
        }
    }

    /// Convert CommandCode enum to byte value
    pub fn to_u8(self) -> u8 {
        match self {
            Self::WriteToDisplay => CMD_WRITE_TO_DISPLAY,
            Self::ClearUnit => CMD_CLEAR_UNIT,
            Self::ClearUnitAlternate => CMD_CLEAR_UNIT_ALTERNATE,
            Self::ClearFormatTable => CMD_CLEAR_FORMAT_TABLE,
            Self::ReadMdtFields => CMD_READ_MDT_FIELDS,
            Self::ReadMdtFieldsAlt => CMD_READ_MDT_FIELDS_ALT,
            Self::ReadImmediate => CMD_READ_IMMEDIATE,
            Self::ReadImmediateAlt => CMD_READ_IMMEDIATE_ALT,
            Self::ReadScreenImmediate => CMD_READ_SCREEN_IMMEDIATE,
            Self::WriteStructuredField => CMD_WRITE_STRUCTURED_FIELD,
            Self::SaveScreen => CMD_SAVE_SCREEN,
            Self::SavePartialScreen => CMD_SAVE_PARTIAL_SCREEN,
            Self::RestoreScreen => CMD_RESTORE_SCREEN,
            Self::RestorePartialScreen => CMD_RESTORE_PARTIAL_SCREEN,
            Self::WriteErrorCode => CMD_WRITE_ERROR_CODE,
            Self::WriteErrorCodeWindow => CMD_WRITE_ERROR_CODE_WINDOW,
            Self::ReadInputFields => CMD_READ_INPUT_FIELDS,
            Self::Roll => CMD_ROLL,
        }
    }
}
