use rdev::Key;

pub const VK_BACKSPACE: u16 = 0x08;
pub const VK_TAB: u16 = 0x09;
pub const VK_ENTER: u16 = 0x0D;
pub const VK_SHIFT: u16 = 0x10;
pub const VK_CONTROL: u16 = 0x11;
pub const VK_ALT: u16 = 0x12;
pub const VK_PAUSE: u16 = 0x13;
pub const VK_CAPSLOCK: u16 = 0x14;
pub const VK_ESCAPE: u16 = 0x1B;
pub const VK_SPACE: u16 = 0x20;
pub const VK_C: u16 = 0x43;
pub const VK_LWIN: u16 = 0x5B;
pub const VK_RWIN: u16 = 0x5C;
pub const VK_LSHIFT: u16 = 0xA0;
pub const VK_RSHIFT: u16 = 0xA1;
pub const VK_LCONTROL: u16 = 0xA2;
pub const VK_RCONTROL: u16 = 0xA3;
pub const VK_LALT: u16 = 0xA4;
pub const VK_RALT: u16 = 0xA5;

/// Canonical key-name table: every name the chord grammar accepts as a
/// primary key, paired with its virtual-key code. Names are matched
/// case-insensitively; the spelling here is what [`name_from_virtual_key`]
/// and chord formatting produce.
pub const NAMED_KEYS: &[(&str, u16)] = &[
    ("A", 0x41),
    ("B", 0x42),
    ("C", 0x43),
    ("D", 0x44),
    ("E", 0x45),
    ("F", 0x46),
    ("G", 0x47),
    ("H", 0x48),
    ("I", 0x49),
    ("J", 0x4A),
    ("K", 0x4B),
    ("L", 0x4C),
    ("M", 0x4D),
    ("N", 0x4E),
    ("O", 0x4F),
    ("P", 0x50),
    ("Q", 0x51),
    ("R", 0x52),
    ("S", 0x53),
    ("T", 0x54),
    ("U", 0x55),
    ("V", 0x56),
    ("W", 0x57),
    ("X", 0x58),
    ("Y", 0x59),
    ("Z", 0x5A),
    ("0", 0x30),
    ("1", 0x31),
    ("2", 0x32),
    ("3", 0x33),
    ("4", 0x34),
    ("5", 0x35),
    ("6", 0x36),
    ("7", 0x37),
    ("8", 0x38),
    ("9", 0x39),
    ("F1", 0x70),
    ("F2", 0x71),
    ("F3", 0x72),
    ("F4", 0x73),
    ("F5", 0x74),
    ("F6", 0x75),
    ("F7", 0x76),
    ("F8", 0x77),
    ("F9", 0x78),
    ("F10", 0x79),
    ("F11", 0x7A),
    ("F12", 0x7B),
    ("F13", 0x7C),
    ("F14", 0x7D),
    ("F15", 0x7E),
    ("F16", 0x7F),
    ("F17", 0x80),
    ("F18", 0x81),
    ("F19", 0x82),
    ("F20", 0x83),
    ("F21", 0x84),
    ("F22", 0x85),
    ("F23", 0x86),
    ("F24", 0x87),
    ("Backspace", VK_BACKSPACE),
    ("Tab", VK_TAB),
    ("Enter", VK_ENTER),
    ("Pause", VK_PAUSE),
    ("CapsLock", VK_CAPSLOCK),
    ("Escape", VK_ESCAPE),
    ("Space", VK_SPACE),
    ("PageUp", 0x21),
    ("PageDown", 0x22),
    ("End", 0x23),
    ("Home", 0x24),
    ("Left", 0x25),
    ("Up", 0x26),
    ("Right", 0x27),
    ("Down", 0x28),
    ("PrintScreen", 0x2C),
    ("Insert", 0x2D),
    ("Delete", 0x2E),
    // numpad keys are distinct codes from the top-row digits
    ("Numpad0", 0x60),
    ("Numpad1", 0x61),
    ("Numpad2", 0x62),
    ("Numpad3", 0x63),
    ("Numpad4", 0x64),
    ("Numpad5", 0x65),
    ("Numpad6", 0x66),
    ("Numpad7", 0x67),
    ("Numpad8", 0x68),
    ("Numpad9", 0x69),
    ("NumpadMultiply", 0x6A),
    ("NumpadAdd", 0x6B),
    ("NumpadSeparator", 0x6C),
    ("NumpadSubtract", 0x6D),
    ("NumpadDecimal", 0x6E),
    ("NumpadDivide", 0x6F),
    ("NumLock", 0x90),
    ("ScrollLock", 0x91),
    ("Semicolon", 0xBA),
    ("Plus", 0xBB),
    ("Comma", 0xBC),
    ("Minus", 0xBD),
    ("Period", 0xBE),
    ("Slash", 0xBF),
    ("Backquote", 0xC0),
    ("LeftBracket", 0xDB),
    ("Backslash", 0xDC),
    ("RightBracket", 0xDD),
    ("Quote", 0xDE),
    // modifier-only keys can also serve as a chord's primary key
    ("LeftShift", VK_LSHIFT),
    ("RightShift", VK_RSHIFT),
    ("LeftCtrl", VK_LCONTROL),
    ("RightCtrl", VK_RCONTROL),
    ("LeftAlt", VK_LALT),
    ("RightAlt", VK_RALT),
];

/// Case-insensitive name lookup. Returns the code and the canonical
/// spelling of the name.
pub fn virtual_key_from_name(name: &str) -> Option<(u16, &'static str)> {
    let token = name.trim();
    if token.is_empty() {
        return None;
    }
    for &(canonical, vk) in NAMED_KEYS {
        if canonical.eq_ignore_ascii_case(token) {
            return Some((vk, canonical));
        }
    }
    // a few common alternate spellings
    let vk = match token.to_ascii_uppercase().as_str() {
        "RETURN" => VK_ENTER,
        "ESC" => VK_ESCAPE,
        "UPARROW" => 0x26,
        "DOWNARROW" => 0x28,
        "LEFTARROW" => 0x25,
        "RIGHTARROW" => 0x27,
        _ => return None,
    };
    NAMED_KEYS
        .iter()
        .find(|&&(_, code)| code == vk)
        .map(|&(canonical, code)| (code, canonical))
}

pub fn name_from_virtual_key(vk: u16) -> Option<&'static str> {
    NAMED_KEYS
        .iter()
        .find(|&&(_, code)| code == vk)
        .map(|&(name, _)| name)
}

/// Map a hook event key to the virtual-key code the rest of the crate
/// speaks. Keys with no stable cross-platform code map to `None` and are
/// ignored by the hook.
pub fn virtual_key_from_rdev(key: Key) -> Option<u16> {
    let vk = match key {
        Key::Alt => VK_LALT,
        Key::AltGr => VK_RALT,
        Key::ControlLeft => VK_LCONTROL,
        Key::ControlRight => VK_RCONTROL,
        Key::ShiftLeft => VK_LSHIFT,
        Key::ShiftRight => VK_RSHIFT,
        Key::MetaLeft => VK_LWIN,
        Key::MetaRight => VK_RWIN,
        Key::Backspace => VK_BACKSPACE,
        Key::Tab => VK_TAB,
        Key::Return | Key::KpReturn => VK_ENTER,
        Key::Escape => VK_ESCAPE,
        Key::Space => VK_SPACE,
        Key::CapsLock => VK_CAPSLOCK,
        Key::Pause => VK_PAUSE,
        Key::PageUp => 0x21,
        Key::PageDown => 0x22,
        Key::End => 0x23,
        Key::Home => 0x24,
        Key::LeftArrow => 0x25,
        Key::UpArrow => 0x26,
        Key::RightArrow => 0x27,
        Key::DownArrow => 0x28,
        Key::PrintScreen => 0x2C,
        Key::Insert => 0x2D,
        Key::Delete => 0x2E,
        Key::NumLock => 0x90,
        Key::ScrollLock => 0x91,
        Key::F1 => 0x70,
        Key::F2 => 0x71,
        Key::F3 => 0x72,
        Key::F4 => 0x73,
        Key::F5 => 0x74,
        Key::F6 => 0x75,
        Key::F7 => 0x76,
        Key::F8 => 0x77,
        Key::F9 => 0x78,
        Key::F10 => 0x79,
        Key::F11 => 0x7A,
        Key::F12 => 0x7B,
        Key::Num0 => 0x30,
        Key::Num1 => 0x31,
        Key::Num2 => 0x32,
        Key::Num3 => 0x33,
        Key::Num4 => 0x34,
        Key::Num5 => 0x35,
        Key::Num6 => 0x36,
        Key::Num7 => 0x37,
        Key::Num8 => 0x38,
        Key::Num9 => 0x39,
        Key::KeyA => 0x41,
        Key::KeyB => 0x42,
        Key::KeyC => 0x43,
        Key::KeyD => 0x44,
        Key::KeyE => 0x45,
        Key::KeyF => 0x46,
        Key::KeyG => 0x47,
        Key::KeyH => 0x48,
        Key::KeyI => 0x49,
        Key::KeyJ => 0x4A,
        Key::KeyK => 0x4B,
        Key::KeyL => 0x4C,
        Key::KeyM => 0x4D,
        Key::KeyN => 0x4E,
        Key::KeyO => 0x4F,
        Key::KeyP => 0x50,
        Key::KeyQ => 0x51,
        Key::KeyR => 0x52,
        Key::KeyS => 0x53,
        Key::KeyT => 0x54,
        Key::KeyU => 0x55,
        Key::KeyV => 0x56,
        Key::KeyW => 0x57,
        Key::KeyX => 0x58,
        Key::KeyY => 0x59,
        Key::KeyZ => 0x5A,
        Key::Kp0 => 0x60,
        Key::Kp1 => 0x61,
        Key::Kp2 => 0x62,
        Key::Kp3 => 0x63,
        Key::Kp4 => 0x64,
        Key::Kp5 => 0x65,
        Key::Kp6 => 0x66,
        Key::Kp7 => 0x67,
        Key::Kp8 => 0x68,
        Key::Kp9 => 0x69,
        Key::KpMultiply => 0x6A,
        Key::KpPlus => 0x6B,
        Key::KpMinus => 0x6D,
        Key::KpDelete => 0x6E,
        Key::KpDivide => 0x6F,
        Key::SemiColon => 0xBA,
        Key::Equal => 0xBB,
        Key::Comma => 0xBC,
        Key::Minus => 0xBD,
        Key::Dot => 0xBE,
        Key::Slash => 0xBF,
        Key::BackQuote => 0xC0,
        Key::LeftBracket => 0xDB,
        Key::BackSlash => 0xDC,
        Key::RightBracket => 0xDD,
        Key::Quote => 0xDE,
        _ => return None,
    };
    Some(vk)
}

/// Inverse of [`virtual_key_from_rdev`] for the event-simulation path on
/// platforms without a native SendInput equivalent. F13-F24 have no rdev
/// representation and map to `None`.
pub fn rdev_key_from_virtual(vk: u16) -> Option<Key> {
    let key = match vk {
        VK_CONTROL | VK_LCONTROL => Key::ControlLeft,
        VK_RCONTROL => Key::ControlRight,
        VK_SHIFT | VK_LSHIFT => Key::ShiftLeft,
        VK_RSHIFT => Key::ShiftRight,
        VK_ALT | VK_LALT => Key::Alt,
        VK_RALT => Key::AltGr,
        VK_LWIN => Key::MetaLeft,
        VK_RWIN => Key::MetaRight,
        VK_BACKSPACE => Key::Backspace,
        VK_TAB => Key::Tab,
        VK_ENTER => Key::Return,
        VK_ESCAPE => Key::Escape,
        VK_SPACE => Key::Space,
        VK_CAPSLOCK => Key::CapsLock,
        VK_PAUSE => Key::Pause,
        0x21 => Key::PageUp,
        0x22 => Key::PageDown,
        0x23 => Key::End,
        0x24 => Key::Home,
        0x25 => Key::LeftArrow,
        0x26 => Key::UpArrow,
        0x27 => Key::RightArrow,
        0x28 => Key::DownArrow,
        0x2C => Key::PrintScreen,
        0x2D => Key::Insert,
        0x2E => Key::Delete,
        0x90 => Key::NumLock,
        0x91 => Key::ScrollLock,
        0x70 => Key::F1,
        0x71 => Key::F2,
        0x72 => Key::F3,
        0x73 => Key::F4,
        0x74 => Key::F5,
        0x75 => Key::F6,
        0x76 => Key::F7,
        0x77 => Key::F8,
        0x78 => Key::F9,
        0x79 => Key::F10,
        0x7A => Key::F11,
        0x7B => Key::F12,
        0x30 => Key::Num0,
        0x31 => Key::Num1,
        0x32 => Key::Num2,
        0x33 => Key::Num3,
        0x34 => Key::Num4,
        0x35 => Key::Num5,
        0x36 => Key::Num6,
        0x37 => Key::Num7,
        0x38 => Key::Num8,
        0x39 => Key::Num9,
        0x41 => Key::KeyA,
        0x42 => Key::KeyB,
        0x43 => Key::KeyC,
        0x44 => Key::KeyD,
        0x45 => Key::KeyE,
        0x46 => Key::KeyF,
        0x47 => Key::KeyG,
        0x48 => Key::KeyH,
        0x49 => Key::KeyI,
        0x4A => Key::KeyJ,
        0x4B => Key::KeyK,
        0x4C => Key::KeyL,
        0x4D => Key::KeyM,
        0x4E => Key::KeyN,
        0x4F => Key::KeyO,
        0x50 => Key::KeyP,
        0x51 => Key::KeyQ,
        0x52 => Key::KeyR,
        0x53 => Key::KeyS,
        0x54 => Key::KeyT,
        0x55 => Key::KeyU,
        0x56 => Key::KeyV,
        0x57 => Key::KeyW,
        0x58 => Key::KeyX,
        0x59 => Key::KeyY,
        0x5A => Key::KeyZ,
        0x60 => Key::Kp0,
        0x61 => Key::Kp1,
        0x62 => Key::Kp2,
        0x63 => Key::Kp3,
        0x64 => Key::Kp4,
        0x65 => Key::Kp5,
        0x66 => Key::Kp6,
        0x67 => Key::Kp7,
        0x68 => Key::Kp8,
        0x69 => Key::Kp9,
        0x6A => Key::KpMultiply,
        0x6B => Key::KpPlus,
        0x6D => Key::KpMinus,
        0x6E => Key::KpDelete,
        0x6F => Key::KpDivide,
        0xBA => Key::SemiColon,
        0xBB => Key::Equal,
        0xBC => Key::Comma,
        0xBD => Key::Minus,
        0xBE => Key::Dot,
        0xBF => Key::Slash,
        0xC0 => Key::BackQuote,
        0xDB => Key::LeftBracket,
        0xDC => Key::BackSlash,
        0xDD => Key::RightBracket,
        0xDE => Key::Quote,
        _ => return None,
    };
    Some(key)
}

/// On macOS the Meta (Command) keys stand in for Ctrl when deciding
/// whether the control modifier is already held.
#[cfg(target_os = "macos")]
pub const CONTROL_CODES: &[u16] = &[VK_CONTROL, VK_LCONTROL, VK_RCONTROL, VK_LWIN, VK_RWIN];
#[cfg(not(target_os = "macos"))]
pub const CONTROL_CODES: &[u16] = &[VK_CONTROL, VK_LCONTROL, VK_RCONTROL];

pub const ALT_CODES: &[u16] = &[VK_ALT, VK_LALT, VK_RALT];
pub const SHIFT_CODES: &[u16] = &[VK_SHIFT, VK_LSHIFT, VK_RSHIFT];

pub fn is_control_code(vk: u16) -> bool {
    CONTROL_CODES.contains(&vk)
}

pub fn is_alt_code(vk: u16) -> bool {
    ALT_CODES.contains(&vk)
}

pub fn is_shift_code(vk: u16) -> bool {
    SHIFT_CODES.contains(&vk)
}
