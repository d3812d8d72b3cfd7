//! Modifier sets and key codes
//!
//! Chords are configured as strings ("cmd+shift", "g") and compared against
//! the raw macOS virtual key code and modifier flags of each key-down event.

/// Modifier key flag masks from macOS CGEventFlags
#[cfg(target_os = "macos")]
pub mod flags {
    use core_graphics::event::CGEventFlags;

    pub const COMMAND: CGEventFlags = CGEventFlags::CGEventFlagCommand;
    pub const SHIFT: CGEventFlags = CGEventFlags::CGEventFlagShift;
    /// Option/Alt key modifier flag
    pub const OPTION: CGEventFlags = CGEventFlags::CGEventFlagAlternate;
    pub const CONTROL: CGEventFlags = CGEventFlags::CGEventFlagControl;
}

/// The set of modifier keys held during an event or required by a chord
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Modifiers {
    pub command: bool,
    pub shift: bool,
    pub option: bool,
    pub control: bool,
}

impl Modifiers {
    pub const NONE: Modifiers = Modifiers {
        command: false,
        shift: false,
        option: false,
        control: false,
    };

    /// Build from CGEventFlags, ignoring device-dependent bits
    #[cfg(target_os = "macos")]
    pub fn from_flags(flags: core_graphics::event::CGEventFlags) -> Self {
        Self {
            command: flags.contains(flags::COMMAND),
            shift: flags.contains(flags::SHIFT),
            option: flags.contains(flags::OPTION),
            control: flags.contains(flags::CONTROL),
        }
    }

    /// Check if no modifier is held
    pub fn is_empty(&self) -> bool {
        *self == Self::NONE
    }

    /// Parse "cmd+shift", "Ctrl Option", ... into a modifier set.
    ///
    /// Separators are `+` and whitespace, matching is case-insensitive and
    /// unknown words are ignored.
    pub fn parse(raw: &str) -> Self {
        let mut mods = Self::NONE;
        for part in raw
            .split(|c: char| c == '+' || c.is_whitespace())
            .filter(|p| !p.is_empty())
        {
            match part.to_ascii_lowercase().as_str() {
                "cmd" | "command" => mods.command = true,
                "shift" => mods.shift = true,
                "option" | "opt" | "alt" => mods.option = true,
                "control" | "ctrl" => mods.control = true,
                _ => {}
            }
        }
        mods
    }
}

impl std::fmt::Display for Modifiers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut parts = Vec::new();
        if self.control {
            parts.push("ctrl");
        }
        if self.option {
            parts.push("option");
        }
        if self.shift {
            parts.push("shift");
        }
        if self.command {
            parts.push("cmd");
        }
        write!(f, "{}", parts.join("+"))
    }
}

/// macOS virtual key codes (ANSI layout) for letters and digits
const KEY_CODES: &[(char, u16)] = &[
    ('a', 0x00), ('b', 0x0B), ('c', 0x08), ('d', 0x02), ('e', 0x0E),
    ('f', 0x03), ('g', 0x05), ('h', 0x04), ('i', 0x22), ('j', 0x26),
    ('k', 0x28), ('l', 0x25), ('m', 0x2E), ('n', 0x2D), ('o', 0x1F),
    ('p', 0x23), ('q', 0x0C), ('r', 0x0F), ('s', 0x01), ('t', 0x11),
    ('u', 0x20), ('v', 0x09), ('w', 0x0D), ('x', 0x07), ('y', 0x10),
    ('z', 0x06),
    ('0', 0x1D), ('1', 0x12), ('2', 0x13), ('3', 0x14), ('4', 0x15),
    ('5', 0x17), ('6', 0x16), ('7', 0x1A), ('8', 0x1C), ('9', 0x19),
];

/// Key code for a single letter or digit
pub fn key_code_for_char(c: char) -> Option<u16> {
    let c = c.to_ascii_lowercase();
    KEY_CODES.iter().find(|(k, _)| *k == c).map(|(_, code)| *code)
}

/// Letter or digit producing `code`, if it is one
pub fn char_for_key_code(code: u16) -> Option<char> {
    KEY_CODES.iter().find(|(_, c)| *c == code).map(|(k, _)| *k)
}

/// Resolve a configured key: one letter/digit, a decimal code of two or
/// more digits, or a `0x` hex code.
pub fn parse_key(raw: &str) -> Option<u16> {
    let raw = raw.trim();
    let mut chars = raw.chars();
    match (chars.next(), chars.next()) {
        (None, _) => None,
        (Some(c), None) => key_code_for_char(c),
        _ => {
            if let Some(hex) = raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
                u16::from_str_radix(hex, 16).ok()
            } else {
                raw.parse().ok()
            }
        }
    }
}
