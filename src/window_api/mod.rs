//! Probes the desktop for the current foreground application and the time
//! since the last user input. [GenericProbe] picks the backend matching the
//! compile target.

#[cfg(feature = "win")]
pub mod win;
#[cfg(feature = "x11")]
pub mod x11;

#[cfg(feature = "win")]
extern crate windows;

#[cfg(feature = "x11")]
extern crate xcb;

use anyhow::Result;
#[cfg(test)]
use mockall::automock;

/// One observation of the foreground application. Empty fields and the
/// `"Unknown"` process name are valid fallbacks when the desktop won't say.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForegroundApp {
    /// Executable basename, for example `chrome.exe` or `nvim`.
    pub process_name: String,
    /// Title of the focused window.
    pub window_title: String,
    /// Full path to the executable.
    pub exe_path: String,
}

impl ForegroundApp {
    pub fn unknown() -> Self {
        Self {
            process_name: "Unknown".into(),
            window_title: String::new(),
            exe_path: String::new(),
        }
    }
}

/// Contract every desktop backend implements. Failures stay inside the
/// backend: both calls always produce a usable value, so a sampling tick can
/// never be stalled by a desktop hiccup.
#[cfg_attr(test, automock)]
pub trait SystemProbe: Send {
    fn foreground_app(&mut self) -> ForegroundApp;

    /// Whole seconds since the last user input.
    fn idle_seconds(&mut self) -> i64;
}

/// Serves as a cross-compatible [SystemProbe] implementation.
pub struct GenericProbe {
    inner: Box<dyn SystemProbe>,
}

impl GenericProbe {
    pub fn new() -> Result<Self> {
        cfg_if::cfg_if! {
            if #[cfg(feature = "win")] {
                Ok(Self {
                    inner: Box::new(win::WindowsProbe::new()),
                })
            }
            else if #[cfg(feature = "x11")] {
                Ok(Self {
                    inner: Box::new(x11::X11Probe::new()?),
                })
            }
            else {
                // This runtime error is needed to allow the project to be compiled for during testing.
                unimplemented!("No system probe was specified")
            }
        }
    }
}

impl SystemProbe for GenericProbe {
    fn foreground_app(&mut self) -> ForegroundApp {
        self.inner.foreground_app()
    }

    fn idle_seconds(&mut self) -> i64 {
        self.inner.idle_seconds()
    }
}

#[cfg(any(feature = "win", feature = "x11"))]
fn exe_basename(path: &str) -> String {
    std::path::Path::new(path)
        .file_name()
        .map(|v| v.to_string_lossy().to_string())
        .unwrap_or_else(|| path.to_string())
}
