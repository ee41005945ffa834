//! RDS group types

use std::fmt;

/// Error level the chip reports for one block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum BlockError {
    None = 0,
    /// 1-2 bit errors corrected
    Small = 1,
    /// 3-5 bit errors corrected
    Large = 2,
    Uncorrectable = 3,
}

impl From<u8> for BlockError {
    fn from(level: u8) -> Self {
        match level & 0x3 {
            0 => Self::None,
            1 => Self::Small,
            2 => Self::Large,
            _ => Self::Uncorrectable,
        }
    }
}

impl BlockError {
    pub fn is_usable(self) -> bool {
        self != Self::Uncorrectable
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupVersion {
    A,
    B,
}

/// Group type code (0-15) plus version
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupType {
    pub code: u8,
    pub version: GroupVersion,
}

impl fmt::Display for GroupType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let version = match self.version {
            GroupVersion::A => 'A',
            GroupVersion::B => 'B',
        };
        write!(f, "{}{}", self.code, version)
    }
}

/// One received group: blocks A-D and their error levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SidebandGroup {
    pub blocks: [u16; 4],
    pub errors: [BlockError; 4],
}

impl SidebandGroup {
    /// Build from register contents and raw 2-bit error levels
    pub fn new(blocks: [u16; 4], raw_errors: [u8; 4]) -> Self {
        Self {
            blocks,
            errors: raw_errors.map(BlockError::from),
        }
    }

    /// Group with every block error-free
    pub fn clean(blocks: [u16; 4]) -> Self {
        Self::new(blocks, [0; 4])
    }

    pub fn a(&self) -> u16 {
        self.blocks[0]
    }

    pub fn b(&self) -> u16 {
        self.blocks[1]
    }

    pub fn c(&self) -> u16 {
        self.blocks[2]
    }

    pub fn d(&self) -> u16 {
        self.blocks[3]
    }

    /// Blocks A and B carry PI and the group header; without them nothing can be placed
    pub fn header_valid(&self) -> bool {
        self.errors[0].is_usable() && self.errors[1].is_usable()
    }

    pub fn c_valid(&self) -> bool {
        self.errors[2].is_usable()
    }

    pub fn d_valid(&self) -> bool {
        self.errors[3].is_usable()
    }

    pub fn group_type(&self) -> GroupType {
        let b = self.b();
        GroupType {
            code: ((b >> 12) & 0x0F) as u8,
            version: if b & 0x0800 == 0 {
                GroupVersion::A
            } else {
                GroupVersion::B
            },
        }
    }

    /// Program identification code
    pub fn pi(&self) -> u16 {
        self.a()
    }

    /// Program type code (block B bits 9..5)
    pub fn pty(&self) -> u8 {
        ((self.b() >> 5) & 0x1F) as u8
    }

    /// Traffic program flag (block B bit 10)
    pub fn traffic_program(&self) -> bool {
        self.b() & 0x0400 != 0
    }
}
