use anyhow::{anyhow, Result};
use tracing::error;
use windows::{
    core::PWSTR,
    Win32::{
        Foundation::{CloseHandle, BOOL, HANDLE},
        System::{
            SystemInformation::GetTickCount64,
            Threading::{
                OpenProcess, QueryFullProcessImageNameW, PROCESS_NAME_WIN32,
                PROCESS_QUERY_LIMITED_INFORMATION,
            },
        },
        UI::{
            Input::KeyboardAndMouse::{GetLastInputInfo, LASTINPUTINFO},
            WindowsAndMessaging::{GetForegroundWindow, GetWindowTextW, GetWindowThreadProcessId},
        },
    },
};

use super::{exe_basename, ForegroundApp, SystemProbe};

#[tracing::instrument]
fn read_foreground() -> Result<ForegroundApp> {
    let window = unsafe { GetForegroundWindow() };
    if window.is_invalid() {
        return Err(anyhow!("No foreground window"));
    }

    let mut text: [u16; 4096] = [0; 4096];
    let title = {
        let len = unsafe { GetWindowTextW(window, &mut text) };
        String::from_utf16_lossy(&text[..len as usize])
    };

    let mut pid = 0u32;
    unsafe { GetWindowThreadProcessId(window, Some(&mut pid)) };
    if pid == 0 {
        // Shell surfaces and protected windows report no owner. Keep the
        // title, the process stays unattributed.
        return Ok(ForegroundApp {
            process_name: "Unknown".into(),
            window_title: title,
            exe_path: String::new(),
        });
    }

    let process_handle =
        unsafe { OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, BOOL::from(false), pid) }
            .inspect_err(|e| error!("Failed to open process {e:?}"))?;

    let exe_path = unsafe { query_image_path(process_handle, &mut text) };

    unsafe { CloseHandle(process_handle) }
        .inspect_err(|e| error!("Failed to close handle {e:?}"))?;

    let exe_path = exe_path?;
    Ok(ForegroundApp {
        process_name: exe_basename(&exe_path),
        window_title: title,
        exe_path,
    })
}

unsafe fn query_image_path(process_handle: HANDLE, text: &mut [u16]) -> Result<String> {
    let mut length = text.len() as u32;
    QueryFullProcessImageNameW(
        process_handle,
        PROCESS_NAME_WIN32,
        PWSTR(text.as_mut_ptr()),
        &mut length,
    )?;
    Ok(String::from_utf16_lossy(&text[..length as usize]))
}

fn read_idle_seconds() -> Result<i64> {
    let mut last: LASTINPUTINFO = LASTINPUTINFO {
        cbSize: size_of::<LASTINPUTINFO>() as u32,
        dwTime: 0,
    };
    let is_success = unsafe { GetLastInputInfo(&mut last) };
    if !is_success.as_bool() {
        return Err(anyhow!("Failed to retrieve user idle time"));
    }

    let tick_count = unsafe { GetTickCount64() };
    let idle_ms = tick_count.saturating_sub(last.dwTime as u64);
    Ok((idle_ms / 1000) as i64)
}

pub struct WindowsProbe {}

impl WindowsProbe {
    pub fn new() -> Self {
        Self {}
    }
}

impl Default for WindowsProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemProbe for WindowsProbe {
    fn foreground_app(&mut self) -> ForegroundApp {
        match read_foreground() {
            Ok(v) => v,
            Err(e) => {
                error!("Falling back to a placeholder observation {e:?}");
                ForegroundApp::unknown()
            }
        }
    }

    fn idle_seconds(&mut self) -> i64 {
        match read_idle_seconds() {
            Ok(v) => v,
            Err(e) => {
                error!("Treating idle time as zero {e:?}");
                0
            }
        }
    }
}
