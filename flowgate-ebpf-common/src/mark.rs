//! The 32-bit mark word: the sole in-band channel between processors and
//! between hooks, carried on the packet metadata (`skb->mark` / the XDP
//! equivalent).
//!
//! Bit layout (fixed, wire-stable):
//!   bits 0-7   flow id (0 = default)
//!   bits 8-14  action
//!   bit  15    port-reuse-allowed flag
//!   bits 24-31 source class

const FLOW_ID_MASK: u32 = 0x0000_00FF;
const ACTION_MASK: u32 = 0x0000_7F00;
const REUSE_MASK: u32 = 0x0000_8000;
const SOURCE_MASK: u32 = 0xFF00_0000;

const ACTION_SHIFT: u32 = 8;
const SOURCE_SHIFT: u32 = 24;

/// Verdict produced by the Flow Verdict processor, stored in bits 8-14.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowAction {
    KeepGoing,
    Direct,
    Drop,
    Redirect,
    AllowReuse,
    /// An action byte outside the known set; preserved rather than rejected
    /// so a forward-compatible control plane can't wedge the data plane.
    Unknown(u8),
}

impl FlowAction {
    pub const fn from_bits(bits: u8) -> Self {
        match bits {
            0 => FlowAction::KeepGoing,
            1 => FlowAction::Direct,
            2 => FlowAction::Drop,
            3 => FlowAction::Redirect,
            4 => FlowAction::AllowReuse,
            other => FlowAction::Unknown(other),
        }
    }

    pub const fn to_bits(self) -> u8 {
        match self {
            FlowAction::KeepGoing => 0,
            FlowAction::Direct => 1,
            FlowAction::Drop => 2,
            FlowAction::Redirect => 3,
            FlowAction::AllowReuse => 4,
            FlowAction::Unknown(b) => b,
        }
    }
}

/// Source class recorded in bits 24-31. Once widened past `Unknown` it must
/// never be widened further by a downstream processor (spec invariant).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceClass {
    Unknown,
    Host,
    Lan,
    Wan,
    Other(u8),
}

impl SourceClass {
    pub const fn from_bits(bits: u8) -> Self {
        match bits {
            0 => SourceClass::Unknown,
            1 => SourceClass::Host,
            2 => SourceClass::Lan,
            4 => SourceClass::Wan,
            other => SourceClass::Other(other),
        }
    }

    pub const fn to_bits(self) -> u8 {
        match self {
            SourceClass::Unknown => 0,
            SourceClass::Host => 1,
            SourceClass::Lan => 2,
            SourceClass::Wan => 4,
            SourceClass::Other(b) => b,
        }
    }
}

/// The mark word, wrapped so bit-twiddling stays in one place.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Mark(pub u32);

impl Mark {
    pub const fn new(bits: u32) -> Self {
        Mark(bits)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn flow_id(self) -> u8 {
        (self.0 & FLOW_ID_MASK) as u8
    }

    #[must_use]
    pub const fn with_flow_id(self, id: u8) -> Self {
        Mark((self.0 & !FLOW_ID_MASK) | (id as u32))
    }

    pub const fn action(self) -> FlowAction {
        FlowAction::from_bits(((self.0 & ACTION_MASK) >> ACTION_SHIFT) as u8)
    }

    #[must_use]
    pub const fn with_action(self, action: FlowAction) -> Self {
        let bits = (action.to_bits() as u32 & 0x7F) << ACTION_SHIFT;
        Mark((self.0 & !ACTION_MASK) | bits)
    }

    pub const fn allow_reuse_port(self) -> bool {
        (self.0 & REUSE_MASK) != 0
    }

    #[must_use]
    pub const fn with_allow_reuse_port(self, allow: bool) -> Self {
        if allow {
            Mark(self.0 | REUSE_MASK)
        } else {
            Mark(self.0 & !REUSE_MASK)
        }
    }

    pub const fn source_class(self) -> SourceClass {
        SourceClass::from_bits(((self.0 & SOURCE_MASK) >> SOURCE_SHIFT) as u8)
    }

    #[must_use]
    pub const fn with_source_class(self, class: SourceClass) -> Self {
        let bits = (class.to_bits() as u32) << SOURCE_SHIFT;
        Mark((self.0 & !SOURCE_MASK) | bits)
    }
}

impl From<u32> for Mark {
    fn from(bits: u32) -> Self {
        Mark(bits)
    }
}

impl From<Mark> for u32 {
    fn from(mark: Mark) -> Self {
        mark.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flow_id_round_trips_without_disturbing_other_fields() {
        let m = Mark::new(0).with_action(FlowAction::Redirect).with_source_class(SourceClass::Wan);
        let m = m.with_flow_id(17);
        assert_eq!(m.flow_id(), 17);
        assert_eq!(m.action(), FlowAction::Redirect);
        assert_eq!(m.source_class(), SourceClass::Wan);
    }

    #[test]
    fn action_field_is_seven_bits_wide() {
        let m = Mark::new(0).with_action(FlowAction::AllowReuse);
        assert_eq!(m.bits(), 4 << 8);
        assert_eq!(m.action(), FlowAction::AllowReuse);
    }

    #[test]
    fn reuse_flag_is_bit_15_only() {
        let m = Mark::new(0).with_allow_reuse_port(true);
        assert_eq!(m.bits(), 1 << 15);
        assert!(m.allow_reuse_port());
        let m = m.with_allow_reuse_port(false);
        assert_eq!(m.bits(), 0);
    }

    #[test]
    fn source_class_occupies_top_byte() {
        let m = Mark::new(0).with_source_class(SourceClass::Lan);
        assert_eq!(m.bits(), 2 << 24);
        assert_eq!(m.source_class(), SourceClass::Lan);
    }

    #[test]
    fn mark_preservation_across_repeated_downstream_rewrites() {
        // Simulates several processors touching the mark in sequence; the
        // flow id set early must survive every later field write.
        let mut m = Mark::new(0).with_flow_id(9);
        m = m.with_source_class(SourceClass::Lan);
        m = m.with_action(FlowAction::KeepGoing);
        m = m.with_allow_reuse_port(true);
        assert_eq!(m.flow_id(), 9);
    }
}
