// NexusLIMS Logger - platform/terminal.rs
//
// Console access for `--console` in release builds.
//
// Release builds on Windows use the GUI subsystem, so the process starts
// with no console and null standard handles; reads from a null stdin look
// like EOF. `ensure_console` attaches to the console of the launching shell
// (or allocates a new one when started from Explorer) and points any
// missing standard handle at it. Handles that are already valid, such as a
// redirected pipe, are left alone.
//
// Elsewhere the standard handles are always inherited and this is a no-op.

use crate::util::error::LoggerError;
use std::path::PathBuf;

/// Make stdin, stdout and stderr usable for the console front-end.
pub fn ensure_console() -> Result<(), LoggerError> {
    imp::ensure_console().map_err(|source| LoggerError::Io {
        path: PathBuf::from("console"),
        operation: "attach to console",
        source,
    })
}

#[cfg(target_os = "windows")]
mod imp {
    use std::ffi::c_void;
    use std::io;

    type Handle = *mut c_void;

    const ATTACH_PARENT_PROCESS: u32 = u32::MAX;
    const STD_INPUT_HANDLE: u32 = -10i32 as u32;
    const STD_OUTPUT_HANDLE: u32 = -11i32 as u32;
    const STD_ERROR_HANDLE: u32 = -12i32 as u32;
    const GENERIC_READ: u32 = 0x8000_0000;
    const GENERIC_WRITE: u32 = 0x4000_0000;
    const FILE_SHARE_READ: u32 = 0x1;
    const FILE_SHARE_WRITE: u32 = 0x2;
    const OPEN_EXISTING: u32 = 3;

    #[link(name = "kernel32")]
    extern "system" {
        fn GetConsoleWindow() -> Handle;
        fn AttachConsole(process_id: u32) -> i32;
        fn AllocConsole() -> i32;
        fn GetStdHandle(std_handle: u32) -> Handle;
        fn SetStdHandle(std_handle: u32, handle: Handle) -> i32;
        fn CreateFileW(
            file_name: *const u16,
            desired_access: u32,
            share_mode: u32,
            security_attributes: *mut c_void,
            creation_disposition: u32,
            flags_and_attributes: u32,
            template_file: Handle,
        ) -> Handle;
    }

    fn missing(handle: Handle) -> bool {
        handle.is_null() || handle as isize == -1
    }

    fn wide(s: &str) -> Vec<u16> {
        s.encode_utf16().chain(std::iter::once(0)).collect()
    }

    /// Open `device` (`CONIN$` or `CONOUT$`) and install it as `std_handle`
    /// if that handle is currently missing.
    fn fill_std_handle(std_handle: u32, device: &str) -> io::Result<()> {
        // SAFETY: GetStdHandle takes no pointers.
        if !missing(unsafe { GetStdHandle(std_handle) }) {
            return Ok(());
        }
        let name = wide(device);
        // SAFETY: name is null-terminated and outlives the call; the other
        // pointer arguments are null, which CreateFileW accepts.
        let handle = unsafe {
            CreateFileW(
                name.as_ptr(),
                GENERIC_READ | GENERIC_WRITE,
                FILE_SHARE_READ | FILE_SHARE_WRITE,
                std::ptr::null_mut(),
                OPEN_EXISTING,
                0,
                std::ptr::null_mut(),
            )
        };
        if missing(handle) {
            return Err(io::Error::last_os_error());
        }
        // SAFETY: handle is a valid console handle owned by the process for
        // its remaining lifetime.
        if unsafe { SetStdHandle(std_handle, handle) } == 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    pub fn ensure_console() -> io::Result<()> {
        // SAFETY: none of these calls take pointers.
        let has_console = unsafe { !GetConsoleWindow().is_null() };
        if !has_console {
            let attached = unsafe { AttachConsole(ATTACH_PARENT_PROCESS) } != 0;
            if !attached && unsafe { AllocConsole() } == 0 {
                return Err(io::Error::last_os_error());
            }
        }
        fill_std_handle(STD_INPUT_HANDLE, "CONIN$")?;
        fill_std_handle(STD_OUTPUT_HANDLE, "CONOUT$")?;
        fill_std_handle(STD_ERROR_HANDLE, "CONOUT$")?;
        Ok(())
    }
}

#[cfg(not(target_os = "windows"))]
mod imp {
    pub fn ensure_console() -> std::io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ensure_console_is_repeatable() {
        ensure_console().unwrap();
        ensure_console().unwrap();
    }

    #[cfg(target_os = "windows")]
    #[test]
    fn standard_handles_are_present_after_attaching() {
        use std::io::Write;
        ensure_console().unwrap();
        std::io::stdout().flush().unwrap();
        std::io::stderr().write_all(b"").unwrap();
    }
}
