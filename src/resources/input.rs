//! Keyboard state shared with scripts.
//!
//! Key codes follow GLFW numbering, which is what the engine's window layer
//! reports. The host feeds presses and releases into a [`KeySource`]; the
//! `Keyboard` script binding only ever reads from it.
use std::cell::RefCell;
use std::fmt;

use rustc_hash::FxHashSet;

/// Read side of the keyboard, queried by the script binding.
pub trait KeySource {
    /// Whether the key with GLFW code `code` is currently held down.
    fn is_pressed(&self, code: i32) -> bool;
}

/// Stock [`KeySource`] backed by a set of held key codes.
///
/// Interior mutability lets the host update it through the same `Rc` the
/// script binding holds.
#[derive(Default)]
pub struct KeyboardState {
    held: RefCell<FxHashSet<i32>>,
}

impl KeyboardState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn press(&self, code: i32) {
        self.held.borrow_mut().insert(code);
    }

    pub fn release(&self, code: i32) {
        self.held.borrow_mut().remove(&code);
    }

    /// Releases every key, e.g. when the window loses focus.
    pub fn clear(&self) {
        self.held.borrow_mut().clear();
    }

    /// Presses or releases by key name. Returns `false` for unknown names.
    pub fn set_by_name(&self, name: &str, pressed: bool) -> bool {
        let Some(code) = key_code(name) else {
            return false;
        };
        if pressed {
            self.press(code);
        } else {
            self.release(code);
        }
        true
    }
}

impl KeySource for KeyboardState {
    fn is_pressed(&self, code: i32) -> bool {
        self.held.borrow().contains(&code)
    }
}

impl fmt::Debug for KeyboardState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut held: Vec<_> = self.held.borrow().iter().copied().collect();
        held.sort_unstable();
        f.debug_struct("KeyboardState").field("held", &held).finish()
    }
}

/// Script-visible key names and their GLFW codes.
pub const KEY_NAMES: &[(&str, i32)] = &[
    ("SPACE", 32),
    ("APOSTROPHE", 39),
    ("COMMA", 44),
    ("MINUS", 45),
    ("PERIOD", 46),
    ("SLASH", 47),
    ("0", 48),
    ("1", 49),
    ("2", 50),
    ("3", 51),
    ("4", 52),
    ("5", 53),
    ("6", 54),
    ("7", 55),
    ("8", 56),
    ("9", 57),
    ("SEMICOLON", 59),
    ("EQUAL", 61),
    ("A", 65),
    ("B", 66),
    ("C", 67),
    ("D", 68),
    ("E", 69),
    ("F", 70),
    ("G", 71),
    ("H", 72),
    ("I", 73),
    ("J", 74),
    ("K", 75),
    ("L", 76),
    ("M", 77),
    ("N", 78),
    ("O", 79),
    ("P", 80),
    ("Q", 81),
    ("R", 82),
    ("S", 83),
    ("T", 84),
    ("U", 85),
    ("V", 86),
    ("W", 87),
    ("X", 88),
    ("Y", 89),
    ("Z", 90),
    ("LEFT_BRACKET", 91),
    ("BACKSLASH", 92),
    ("RIGHT_BRACKET", 93),
    ("GRAVE_ACCENT", 96),
    ("ESCAPE", 256),
    ("ENTER", 257),
    ("TAB", 258),
    ("BACKSPACE", 259),
    ("INSERT", 260),
    ("DELETE", 261),
    ("RIGHT", 262),
    ("LEFT", 263),
    ("DOWN", 264),
    ("UP", 265),
    ("PAGE_UP", 266),
    ("PAGE_DOWN", 267),
    ("HOME", 268),
    ("END", 269),
    ("CAPS_LOCK", 280),
    ("SCROLL_LOCK", 281),
    ("NUM_LOCK", 282),
    ("PRINT_SCREEN", 283),
    ("PAUSE", 284),
    ("F1", 290),
    ("F2", 291),
    ("F3", 292),
    ("F4", 293),
    ("F5", 294),
    ("F6", 295),
    ("F7", 296),
    ("F8", 297),
    ("F9", 298),
    ("F10", 299),
    ("F11", 300),
    ("F12", 301),
    ("KP_0", 320),
    ("KP_1", 321),
    ("KP_2", 322),
    ("KP_3", 323),
    ("KP_4", 324),
    ("KP_5", 325),
    ("KP_6", 326),
    ("KP_7", 327),
    ("KP_8", 328),
    ("KP_9", 329),
    ("KP_DECIMAL", 330),
    ("KP_DIVIDE", 331),
    ("KP_MULTIPLY", 332),
    ("KP_SUBTRACT", 333),
    ("KP_ADD", 334),
    ("KP_ENTER", 335),
    ("KP_EQUAL", 336),
    ("LEFT_SHIFT", 340),
    ("LEFT_CONTROL", 341),
    ("LEFT_ALT", 342),
    ("LEFT_SUPER", 343),
    ("RIGHT_SHIFT", 344),
    ("RIGHT_CONTROL", 345),
    ("RIGHT_ALT", 346),
    ("RIGHT_SUPER", 347),
    ("MENU", 348),
];

/// Looks up a key code by name, ignoring ASCII case.
pub fn key_code(name: &str) -> Option<i32> {
    KEY_NAMES
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|&(_, code)| code)
}
