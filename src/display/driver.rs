//! Hardware seam: the primitives an LCD driver must provide, a device-node
//! implementation, and an in-memory mock for deterministic tests.

#![allow(missing_docs)]

use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Serialize, Serializer};

use crate::core::errors::{NlcdError, Result};

// ──────────────────── primitives ────────────────────

/// Bit set of display lines. Bit `n` is line `n + 1`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct LineMask(u8);

impl LineMask {
    pub const NONE: Self = Self(0);
    pub const LINE_1: Self = Self(1);
    pub const LINE_2: Self = Self(2);
    pub const LINE_3: Self = Self(4);
    pub const LINE_4: Self = Self(8);
    pub const LINE_5: Self = Self(16);
    pub const LINE_6: Self = Self(32);
    pub const ALL: Self = Self(63);

    /// Mask for zero-based line `index`; `None` past the last line.
    #[must_use]
    pub const fn for_line(index: usize) -> Option<Self> {
        if index < 6 {
            Some(Self(1 << index))
        } else {
            None
        }
    }

    #[must_use]
    pub const fn bits(self) -> u8 {
        self.0
    }

    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Zero-based indices of the lines in the mask.
    pub fn lines(self) -> impl Iterator<Item = usize> {
        (0..6).filter(move |i| self.0 & (1 << i) != 0)
    }
}

impl std::ops::BitOr for LineMask {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl std::ops::BitOrAssign for LineMask {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TextColor {
    White,
    Black,
    Red,
    Green,
    Yellow,
    Purple,
    Cyan,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BackgroundColor {
    Black,
    White,
    LightGrey,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Alignment {
    Left,
    Centre,
    Right,
}

/// One driver operation. Also the wire format of [`DeviceNodeDriver`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum DriverCall {
    SetBrightness {
        level: u8,
    },
    SaveBrightness {
        idle: u8,
        active: u8,
    },
    DimWhenIdle {
        enabled: bool,
    },
    DisplayIcon {
        position: u8,
        slot: u16,
    },
    DisplayTextOnLine {
        line: u8,
        text: String,
        pad_for_icon: bool,
        alignment: Alignment,
        color: TextColor,
    },
    ClearLines {
        mask: LineMask,
        background: BackgroundColor,
    },
    WriteImageToFlash {
        slot: u16,
        #[serde(serialize_with = "serialize_hex")]
        data: Vec<u8>,
    },
}

impl DriverCall {
    /// Operation name used in error messages.
    #[must_use]
    pub const fn operation(&self) -> &'static str {
        match self {
            Self::SetBrightness { .. } => "set_brightness",
            Self::SaveBrightness { .. } => "save_brightness",
            Self::DimWhenIdle { .. } => "dim_when_idle",
            Self::DisplayIcon { .. } => "display_icon",
            Self::DisplayTextOnLine { .. } => "display_text_on_line",
            Self::ClearLines { .. } => "clear_lines",
            Self::WriteImageToFlash { .. } => "write_image_to_flash",
        }
    }
}

fn serialize_hex<S: Serializer>(data: &[u8], serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_str(&hex_encode(data))
}

/// Lower-case hex, two digits per byte.
pub(crate) fn hex_encode(data: &[u8]) -> String {
    use std::fmt::Write as _;
    let mut out = String::with_capacity(data.len() * 2);
    for byte in data {
        let _ = write!(out, "{byte:02x}");
    }
    out
}

/// Primitives of one attached panel. Every call may fail with
/// [`NlcdError::DeviceIo`] once the panel is gone.
pub trait LcdDriver: Send {
    /// Apply a single call. The named methods below all route through here.
    fn send(&mut self, call: DriverCall) -> Result<()>;

    fn set_brightness(&mut self, level: u8) -> Result<()> {
        self.send(DriverCall::SetBrightness { level })
    }

    fn save_brightness(&mut self, idle: u8, active: u8) -> Result<()> {
        self.send(DriverCall::SaveBrightness { idle, active })
    }

    fn dim_when_idle(&mut self, enabled: bool) -> Result<()> {
        self.send(DriverCall::DimWhenIdle { enabled })
    }

    fn display_icon(&mut self, position: u8, slot: u16) -> Result<()> {
        self.send(DriverCall::DisplayIcon { position, slot })
    }

    fn display_text_on_line(
        &mut self,
        line: u8,
        text: &str,
        pad_for_icon: bool,
        alignment: Alignment,
        color: TextColor,
    ) -> Result<()> {
        self.send(DriverCall::DisplayTextOnLine {
            line,
            text: text.to_string(),
            pad_for_icon,
            alignment,
            color,
        })
    }

    fn clear_lines(&mut self, mask: LineMask, background: BackgroundColor) -> Result<()> {
        self.send(DriverCall::ClearLines { mask, background })
    }

    fn write_image_to_flash(&mut self, slot: u16, data: &[u8]) -> Result<()> {
        self.send(DriverCall::WriteImageToFlash {
            slot,
            data: data.to_vec(),
        })
    }
}

/// Locates and opens panels by index.
pub trait DriverFactory: Send {
    fn open(&self, index: u32) -> Result<Box<dyn LcdDriver>>;
}

// ──────────────────── device node ────────────────────

/// Panel exposed by its kernel driver as a character device accepting one
/// JSON command per line.
pub struct DeviceNodeDriver {
    path: PathBuf,
    file: File,
}

impl fmt::Debug for DeviceNodeDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceNodeDriver")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl DeviceNodeDriver {
    /// Open an existing node for writing. The node is never created: an
    /// absent node means the panel is unplugged.
    pub fn open(index: u32, path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .write(true)
            .append(true)
            .open(path)
            .map_err(|e| NlcdError::DeviceUnavailable {
                index,
                details: format!("{}: {e}", path.display()),
            })?;
        Ok(Self {
            path: path.to_path_buf(),
            file,
        })
    }
}

impl LcdDriver for DeviceNodeDriver {
    fn send(&mut self, call: DriverCall) -> Result<()> {
        let operation = call.operation();
        let mut line = serde_json::to_vec(&call).map_err(|e| NlcdError::device_io(operation, e))?;
        line.push(b'\n');
        self.file
            .write_all(&line)
            .and_then(|()| self.file.flush())
            .map_err(|e| NlcdError::device_io(operation, format!("{}: {e}", self.path.display())))
    }
}

/// Opens `/dev/...{index}` style nodes.
#[derive(Debug, Clone)]
pub struct DeviceNodeFactory {
    path_template: String,
}

impl DeviceNodeFactory {
    #[must_use]
    pub fn new(path_template: impl Into<String>) -> Self {
        Self {
            path_template: path_template.into(),
        }
    }

    #[must_use]
    pub fn path_for(&self, index: u32) -> PathBuf {
        PathBuf::from(self.path_template.replace("{index}", &index.to_string()))
    }
}

impl DriverFactory for DeviceNodeFactory {
    fn open(&self, index: u32) -> Result<Box<dyn LcdDriver>> {
        Ok(Box::new(DeviceNodeDriver::open(index, &self.path_for(index))?))
    }
}

// ──────────────────── mock ────────────────────

#[derive(Debug, Default)]
struct MockScript {
    open_failures_left: usize,
    writes_before_failure: Option<usize>,
    opens: usize,
}

/// In-memory factory for tests. Drivers it opens share one call log and
/// one failure script with the factory, so a test can keep a clone of the
/// factory and inspect or steer what the session does.
#[derive(Debug, Clone, Default)]
pub struct MockDriverFactory {
    calls: Arc<Mutex<Vec<DriverCall>>>,
    script: Arc<Mutex<MockScript>>,
}

impl MockDriverFactory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The next `count` opens fail with `DeviceUnavailable`.
    pub fn fail_next_opens(&self, count: usize) {
        self.script.lock().open_failures_left = count;
    }

    /// After `count` more successful writes, every write fails until
    /// [`Self::heal`] is called.
    pub fn fail_writes_after(&self, count: usize) {
        self.script.lock().writes_before_failure = Some(count);
    }

    pub fn heal(&self) {
        let mut script = self.script.lock();
        script.open_failures_left = 0;
        script.writes_before_failure = None;
    }

    #[must_use]
    pub fn open_count(&self) -> usize {
        self.script.lock().opens
    }

    #[must_use]
    pub fn calls(&self) -> Vec<DriverCall> {
        self.calls.lock().clone()
    }

    /// Return and forget the recorded calls.
    pub fn take_calls(&self) -> Vec<DriverCall> {
        std::mem::take(&mut *self.calls.lock())
    }
}

impl DriverFactory for MockDriverFactory {
    fn open(&self, index: u32) -> Result<Box<dyn LcdDriver>> {
        let mut script = self.script.lock();
        script.opens += 1;
        if script.open_failures_left > 0 {
            script.open_failures_left -= 1;
            return Err(NlcdError::DeviceUnavailable {
                index,
                details: "mock device not present".to_string(),
            });
        }
        Ok(Box::new(MockDriver {
            calls: Arc::clone(&self.calls),
            script: Arc::clone(&self.script),
        }))
    }
}

#[derive(Debug)]
pub struct MockDriver {
    calls: Arc<Mutex<Vec<DriverCall>>>,
    script: Arc<Mutex<MockScript>>,
}

impl LcdDriver for MockDriver {
    fn send(&mut self, call: DriverCall) -> Result<()> {
        {
            let mut script = self.script.lock();
            if let Some(left) = script.writes_before_failure.as_mut() {
                if *left == 0 {
                    return Err(NlcdError::device_io(call.operation(), "mock device unplugged"));
                }
                *left -= 1;
            }
        }
        self.calls.lock().push(call);
        Ok(())
    }
}
