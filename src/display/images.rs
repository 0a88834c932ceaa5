//! Icon and splash bitmaps: where they live on disk, which flash slot each
//! occupies, and the one-shot upload to the panel.

#![allow(missing_docs)]

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::core::errors::{NlcdError, Result};
use crate::display::driver::hex_encode;
use crate::display::session::DeviceSession;
use crate::display::severity::Icon;
use crate::logger::jsonl::{EventType, LogEntry, Severity};
use crate::logger::sink::DiagnosticSink;

/// Flash slots reserved for full-screen images, by large-image index.
pub const LARGE_IMAGE_SLOTS: [u16; 8] = [0x270, 0x2bc, 0x308, 0x354, 0x3a0, 0x3ec, 0x438, 0x484];

/// One small icon.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IconImage {
    pub file: PathBuf,
    pub slot: u16,
    /// Expected hex digest of `file`; checked before flashing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
}

/// The full-screen splash, addressed by large-image index.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SplashImage {
    pub file: PathBuf,
    pub large_index: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ImageSetConfig {
    /// Directory relative file names are resolved against.
    pub dir: PathBuf,
    pub up: IconImage,
    pub down: IconImage,
    pub warning: IconImage,
    pub unknown: IconImage,
    pub splash: SplashImage,
}

fn icon(file: &str, slot: u16) -> IconImage {
    IconImage {
        file: PathBuf::from(file),
        slot,
        sha256: None,
    }
}

impl Default for ImageSetConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("images"),
            up: icon("up.bmp", 10),
            down: icon("down.bmp", 11),
            warning: icon("warning.bmp", 12),
            unknown: icon("unknown.bmp", 13),
            splash: SplashImage {
                file: PathBuf::from("splash.bmp"),
                large_index: 0,
                sha256: None,
            },
        }
    }
}

/// One bitmap resolved for upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePlan<'a> {
    pub name: &'static str,
    pub path: PathBuf,
    pub slot: u16,
    pub sha256: Option<&'a str>,
}

impl ImageSetConfig {
    #[must_use]
    pub const fn slot_for(&self, icon: Icon) -> u16 {
        match icon {
            Icon::Up => self.up.slot,
            Icon::Down => self.down.slot,
            Icon::Warning => self.warning.slot,
            Icon::Unknown => self.unknown.slot,
        }
    }

    /// Flash slot of the splash. Falls back to the first large slot when the
    /// index is out of range; `validate` rejects that case at load time.
    #[must_use]
    pub fn splash_slot(&self) -> u16 {
        LARGE_IMAGE_SLOTS
            .get(self.splash.large_index)
            .copied()
            .unwrap_or(LARGE_IMAGE_SLOTS[0])
    }

    pub fn validate(&self) -> Result<()> {
        if self.splash.large_index >= LARGE_IMAGE_SLOTS.len() {
            return Err(NlcdError::InvalidConfig {
                details: format!(
                    "images.splash.large_index must be < {}",
                    LARGE_IMAGE_SLOTS.len()
                ),
            });
        }
        let mut slots = BTreeSet::new();
        for plan in self.plan(Path::new("")) {
            if plan.path.as_os_str().is_empty() {
                return Err(NlcdError::InvalidConfig {
                    details: format!("images.{}.file must not be empty", plan.name),
                });
            }
            if !slots.insert(plan.slot) {
                return Err(NlcdError::InvalidConfig {
                    details: format!("images.{} reuses flash slot {}", plan.name, plan.slot),
                });
            }
            if let Some(pin) = plan.sha256
                && (pin.len() != 64 || !pin.bytes().all(|b| b.is_ascii_hexdigit()))
            {
                return Err(NlcdError::InvalidConfig {
                    details: format!("images.{}.sha256 must be 64 hex characters", plan.name),
                });
            }
        }
        Ok(())
    }

    /// Every bitmap with its resolved path, icons first. Relative `dir` is
    /// taken relative to `base`.
    #[must_use]
    pub fn plan(&self, base: &Path) -> Vec<ImagePlan<'_>> {
        let dir = base.join(&self.dir);
        let icons = [
            ("up", &self.up),
            ("down", &self.down),
            ("warning", &self.warning),
            ("unknown", &self.unknown),
        ];
        let mut plans: Vec<ImagePlan<'_>> = icons
            .into_iter()
            .map(|(name, img)| ImagePlan {
                name,
                path: resolve(&dir, &img.file),
                slot: img.slot,
                sha256: img.sha256.as_deref(),
            })
            .collect();
        plans.push(ImagePlan {
            name: "splash",
            path: resolve(&dir, &self.splash.file),
            slot: self.splash_slot(),
            sha256: self.splash.sha256.as_deref(),
        });
        plans
    }
}

fn resolve(dir: &Path, file: &Path) -> PathBuf {
    if file.as_os_str().is_empty() {
        PathBuf::new()
    } else {
        dir.join(file)
    }
}

/// Outcome of one uploaded (or, on a dry run, checked) bitmap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FlashReport {
    pub name: &'static str,
    pub path: PathBuf,
    pub slot: u16,
    pub bytes: usize,
    pub sha256: String,
    pub written: bool,
}

/// Read and verify every bitmap, then upload them in order through an
/// attached session. Nothing is written unless all files are readable and
/// match their pins. `None` checks the files without touching a panel.
pub fn flash_all(
    session: Option<&mut DeviceSession>,
    images: &ImageSetConfig,
    base: &Path,
    sink: &dyn DiagnosticSink,
) -> Result<Vec<FlashReport>> {
    let mut loaded = Vec::new();
    for plan in images.plan(base) {
        let data = fs::read(&plan.path).map_err(|source| NlcdError::io(&plan.path, source))?;
        let digest = hex_digest(&data);
        if let Some(pin) = plan.sha256
            && !pin.eq_ignore_ascii_case(&digest)
        {
            return Err(NlcdError::InvalidConfig {
                details: format!(
                    "images.{}: {} has sha256 {digest}, expected {pin}",
                    plan.name,
                    plan.path.display()
                ),
            });
        }
        loaded.push((plan, data, digest));
    }

    let mut reports = Vec::with_capacity(loaded.len());
    let mut session = session;
    for (plan, data, digest) in loaded {
        let written = match session.as_deref_mut() {
            Some(s) => {
                s.write_image_to_flash(plan.slot, &data)?;
                true
            }
            None => false,
        };
        let verb = if written { "flashed" } else { "checked" };
        sink.record(
            LogEntry::new(
                EventType::ImageFlashed,
                Severity::Info,
                format!("{verb} image '{}' (slot={})", plan.name, plan.slot),
            )
            .with_details(format!("{} bytes, sha256 {digest}", data.len())),
        );
        reports.push(FlashReport {
            name: plan.name,
            path: plan.path,
            slot: plan.slot,
            bytes: data.len(),
            sha256: digest,
            written,
        });
    }
    Ok(reports)
}

fn hex_digest(data: &[u8]) -> String {
    hex_encode(&Sha256::digest(data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::display::driver::{DriverCall, MockDriverFactory};
    use crate::display::session::LcdSettings;
    use crate::display::severity::SeverityClassifier;
    use crate::logger::sink::{MemorySink, NullSink};

    const EMPTY_SHA256: &str = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

    fn attached_session(factory: &MockDriverFactory) -> DeviceSession {
        let mut session = DeviceSession::new(
            Box::new(factory.clone()),
            0,
            LcdSettings::default(),
            SeverityClassifier::default(),
            Arc::new(NullSink),
        );
        session.attach().unwrap();
        factory.take_calls();
        session
    }

    fn flashed_slots(factory: &MockDriverFactory) -> Vec<u16> {
        factory
            .calls()
            .into_iter()
            .filter_map(|c| match c {
                DriverCall::WriteImageToFlash { slot, .. } => Some(slot),
                _ => None,
            })
            .collect()
    }

    fn write_images(dir: &Path) {
        let images = dir.join("images");
        fs::create_dir_all(&images).unwrap();
        for name in ["up", "down", "warning", "unknown", "splash"] {
            fs::write(images.join(format!("{name}.bmp")), name.as_bytes()).unwrap();
        }
    }

    #[test]
    fn default_slots_match_panel_layout() {
        let images = ImageSetConfig::default();
        assert_eq!(images.slot_for(Icon::Up), 10);
        assert_eq!(images.slot_for(Icon::Down), 11);
        assert_eq!(images.slot_for(Icon::Warning), 12);
        assert_eq!(images.slot_for(Icon::Unknown), 13);
        assert_eq!(images.splash_slot(), LARGE_IMAGE_SLOTS[0]);
        assert!(images.validate().is_ok());
    }

    #[test]
    fn duplicate_slots_rejected() {
        let mut images = ImageSetConfig::default();
        images.unknown.slot = 10;
        let err = images.validate().unwrap_err();
        assert!(err.to_string().contains("reuses flash slot 10"));
    }

    #[test]
    fn malformed_pin_rejected() {
        let mut images = ImageSetConfig::default();
        images.up.sha256 = Some("abc".to_string());
        assert!(images.validate().is_err());
        images.up.sha256 = Some(EMPTY_SHA256.to_string());
        assert!(images.validate().is_ok());
    }

    #[test]
    fn hex_digest_of_empty_input() {
        assert_eq!(hex_digest(b""), EMPTY_SHA256);
    }

    #[test]
    fn flash_uploads_every_image_in_order() {
        let dir = tempfile::tempdir().unwrap();
        write_images(dir.path());
        let factory = MockDriverFactory::new();
        let mut session = attached_session(&factory);
        let sink = MemorySink::new();

        let reports =
            flash_all(Some(&mut session), &ImageSetConfig::default(), dir.path(), &sink).unwrap();

        assert_eq!(reports.len(), 5);
        assert!(reports.iter().all(|r| r.written));
        assert_eq!(flashed_slots(&factory), vec![10, 11, 12, 13, LARGE_IMAGE_SLOTS[0]]);
        assert_eq!(factory.calls().len(), 5);
        assert_eq!(sink.entries().len(), 5);
    }

    #[test]
    fn detached_session_refuses_upload() {
        let dir = tempfile::tempdir().unwrap();
        write_images(dir.path());
        let factory = MockDriverFactory::new();
        let mut session = attached_session(&factory);
        session.detach();

        let err = flash_all(
            Some(&mut session),
            &ImageSetConfig::default(),
            dir.path(),
            &MemorySink::new(),
        )
        .unwrap_err();
        assert!(matches!(err, NlcdError::ContractViolation { .. }));
        assert!(factory.calls().is_empty());
    }

    #[test]
    fn lost_panel_mid_upload_detaches_session() {
        let dir = tempfile::tempdir().unwrap();
        write_images(dir.path());
        let factory = MockDriverFactory::new();
        let mut session = attached_session(&factory);
        factory.fail_writes_after(2);

        let err = flash_all(
            Some(&mut session),
            &ImageSetConfig::default(),
            dir.path(),
            &MemorySink::new(),
        )
        .unwrap_err();
        assert!(err.is_device_failure());
        assert!(!session.is_attached());
        assert_eq!(flashed_slots(&factory), vec![10, 11]);
    }

    #[test]
    fn dry_run_reads_but_never_writes() {
        let dir = tempfile::tempdir().unwrap();
        write_images(dir.path());
        let reports =
            flash_all(None, &ImageSetConfig::default(), dir.path(), &MemorySink::new()).unwrap();
        assert!(reports.iter().all(|r| !r.written));
        assert_eq!(reports[0].bytes, 2);
    }

    #[test]
    fn pin_mismatch_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        write_images(dir.path());
        let mut images = ImageSetConfig::default();
        images.splash.sha256 = Some(EMPTY_SHA256.to_string());
        let factory = MockDriverFactory::new();
        let mut session = attached_session(&factory);

        let err = flash_all(Some(&mut session), &images, dir.path(), &MemorySink::new())
            .unwrap_err();
        assert!(err.to_string().contains("images.splash"));
        assert!(factory.calls().is_empty());
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = flash_all(None, &ImageSetConfig::default(), dir.path(), &MemorySink::new())
            .unwrap_err();
        assert!(matches!(err, NlcdError::Io { .. }));
    }
}
