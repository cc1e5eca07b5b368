//! Foreground process resolver
//!
//! Resolves the process owning the focused window to a normalized executable
//! name. Every failure mode (no focused window, PID 0, access denied, process
//! gone between the focus query and the name query) degrades to an empty
//! string; the engine treats that as "no known game".

use crate::engine::FocusSource;

/// Normalize a process image path to a bare lowercase executable name
///
/// Accepts both path separators so a full image path from any source reduces
/// to its final component.
pub fn normalize_exe_name(path: &str) -> String {
    path.rsplit(['/', '\\'])
        .next()
        .unwrap_or(path)
        .trim()
        .to_lowercase()
}

/// Resolver for the executable owning the foreground window
pub struct ForegroundResolver;

impl ForegroundResolver {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ForegroundResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl FocusSource for ForegroundResolver {
    fn sample(&mut self) -> String {
        foreground_exe().unwrap_or_default()
    }
}

#[cfg(windows)]
fn foreground_exe() -> Option<String> {
    use std::ffi::OsString;
    use std::os::windows::ffi::OsStringExt;
    use windows::core::PWSTR;
    use windows::Win32::Foundation::CloseHandle;
    use windows::Win32::System::Threading::{
        OpenProcess, QueryFullProcessImageNameW, PROCESS_NAME_FORMAT,
        PROCESS_QUERY_LIMITED_INFORMATION,
    };
    use windows::Win32::UI::WindowsAndMessaging::{
        GetForegroundWindow, GetWindowThreadProcessId,
    };

    unsafe {
        let hwnd = GetForegroundWindow();
        if hwnd.0.is_null() {
            return None;
        }

        let mut pid = 0u32;
        let _ = GetWindowThreadProcessId(hwnd, Some(&mut pid));
        if pid == 0 {
            return None;
        }

        let handle = OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, false, pid).ok()?;
        let mut buffer = vec![0u16; 1024];
        let mut size = buffer.len() as u32;
        let success = QueryFullProcessImageNameW(
            handle,
            PROCESS_NAME_FORMAT(0),
            PWSTR(buffer.as_mut_ptr()),
            &mut size,
        )
        .is_ok();
        let _ = CloseHandle(handle);
        if !success || size == 0 {
            return None;
        }

        let path = OsString::from_wide(&buffer[..size as usize])
            .to_string_lossy()
            .to_string();
        let name = normalize_exe_name(&path);
        if name.is_empty() {
            None
        } else {
            Some(name)
        }
    }
}

#[cfg(not(windows))]
fn foreground_exe() -> Option<String> {
    // Focus tracking is only implemented for the Windows desktop; elsewhere
    // the resolver reports no focused process and the engine stays on the
    // desktop profile.
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_strips_path_and_case() {
        assert_eq!(
            normalize_exe_name(r"C:\Program Files\Game\Game.EXE"),
            "game.exe"
        );
        assert_eq!(normalize_exe_name("/usr/bin/Chrome"), "chrome");
        assert_eq!(normalize_exe_name("notepad.exe"), "notepad.exe");
    }

    #[test]
    fn test_normalize_degenerate_inputs() {
        assert_eq!(normalize_exe_name(""), "");
        assert_eq!(normalize_exe_name(r"C:\dir\"), "");
        assert_eq!(normalize_exe_name("  Spaced.exe  "), "spaced.exe");
    }

    #[test]
    fn test_resolver_never_panics() {
        let mut resolver = ForegroundResolver::new();
        // On headless test machines this must degrade to an empty string,
        // never an error.
        let _ = resolver.sample();
    }
}
