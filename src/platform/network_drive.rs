// NexusLIMS Logger - platform/network_drive.rs
//
// Authenticated access to a file store on an SMB share.
//
// Instrument PCs often write to a share that the logged-in account cannot
// read. When the legacy `networkdrive_*` settings are present, the share
// holding the file store is connected with those credentials for the
// lifetime of the process via the Windows WNet API, and disconnected again
// when the returned guard is dropped.
//
// The password is only ever held in memory for the duration of the call and
// is never logged. Connections are temporary (not written to the
// Credential Manager).
//
// On other platforms shares are expected to be mounted by the OS, so
// connecting is a no-op that only logs what would have been used.

use crate::platform::config::{AppConfig, NetworkDriveConfig};
use std::path::Path;

// =============================================================================
// Error type
// =============================================================================

/// Failure to connect the file store share.
#[derive(Debug, Clone)]
pub enum NetworkDriveError {
    /// The WNet API returned a non-zero error code.
    Api {
        share: String,
        code: u32,
        message: String,
    },
    /// Network-drive settings exist but no share could be derived from them.
    NoShare,
}

impl std::fmt::Display for NetworkDriveError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Api {
                share,
                code,
                message,
            } => {
                if message.trim().is_empty() {
                    write!(f, "cannot connect '{share}' (code {code})")
                } else {
                    write!(f, "cannot connect '{share}': {}", message.trim())
                }
            }
            Self::NoShare => write!(
                f,
                "network drive settings are configured but neither networkdrive_hostname \
                 nor the filestore path names a \\\\server\\share"
            ),
        }
    }
}

impl std::error::Error for NetworkDriveError {}

// =============================================================================
// Share resolution (cross-platform)
// =============================================================================

/// Returns `true` for `\\server\...` and `//server/...` paths.
pub fn is_unc_path(path: &Path) -> bool {
    let s = path.to_string_lossy();
    s.starts_with("\\\\") || s.starts_with("//")
}

/// `\\server\share` prefix of a UNC path, or `None` for anything else.
pub fn unc_share_root(path: &Path) -> Option<String> {
    let s = path.to_string_lossy();
    let rest = s.strip_prefix("\\\\").or_else(|| s.strip_prefix("//"))?;
    let mut parts = rest.splitn(3, ['\\', '/']);
    let server = parts.next().filter(|p| !p.is_empty())?;
    let share = parts.next().filter(|p| !p.is_empty())?;
    Some(format!("\\\\{server}\\{share}"))
}

/// Share to authenticate against.
///
/// The filestore path's share when it is a UNC path, otherwise
/// `networkdrive_hostname` when that is itself a UNC share. A bare hostname
/// is not enough to name a share.
pub fn resolve_share(filestore: &Path, drive: &NetworkDriveConfig) -> Option<String> {
    if let Some(share) = unc_share_root(filestore) {
        return Some(share);
    }
    drive
        .hostname
        .as_deref()
        .and_then(|h| unc_share_root(Path::new(h)))
}

// =============================================================================
// Connection guard
// =============================================================================

/// An open share connection; disconnected on drop.
#[derive(Debug)]
pub struct NetworkDriveConnection {
    share: String,
}

impl NetworkDriveConnection {
    pub fn share(&self) -> &str {
        &self.share
    }
}

impl Drop for NetworkDriveConnection {
    fn drop(&mut self) {
        disconnect(&self.share);
    }
}

/// Connect the file store share if network-drive settings are configured.
///
/// Returns `Ok(None)` when there is nothing to connect.
pub fn connect_for(config: &AppConfig) -> Result<Option<NetworkDriveConnection>, NetworkDriveError> {
    let Some(drive) = config.network_drive.as_ref() else {
        return Ok(None);
    };

    let share = resolve_share(&config.filestore_path, drive);

    if !cfg!(target_os = "windows") {
        tracing::info!(
            share = share.as_deref().unwrap_or("<none>"),
            username = %drive.qualified_username(),
            "Network drive settings present; expecting the share to be mounted by the OS"
        );
        return Ok(None);
    }

    let share = share.ok_or(NetworkDriveError::NoShare)?;
    connect(
        &share,
        &drive.qualified_username(),
        drive.password.as_deref().unwrap_or(""),
    )?;
    Ok(Some(NetworkDriveConnection { share }))
}

// =============================================================================
// Windows WNet bindings
// =============================================================================

#[cfg(target_os = "windows")]
mod wnet {
    pub const RESOURCETYPE_DISK: u32 = 0x0000_0001;

    /// Not persisted across logons.
    pub const CONNECT_TEMPORARY: u32 = 0;

    #[repr(C)]
    pub struct NetResourceW {
        pub dw_scope: u32,
        pub dw_type: u32,
        pub dw_display_type: u32,
        pub dw_usage: u32,
        pub lp_local_name: *mut u16,
        pub lp_remote_name: *mut u16,
        pub lp_comment: *mut u16,
        pub lp_provider: *mut u16,
    }

    #[link(name = "Mpr")]
    extern "system" {
        pub fn WNetAddConnection2W(
            lp_net_resource: *const NetResourceW,
            lp_password: *const u16,
            lp_user_name: *const u16,
            dw_flags: u32,
        ) -> u32;

        pub fn WNetCancelConnection2W(lp_name: *const u16, dw_flags: u32, f_force: i32) -> u32;
    }

    pub fn wide(s: &str) -> Vec<u16> {
        s.encode_utf16().chain(std::iter::once(0)).collect()
    }

    pub fn describe(code: u32) -> &'static str {
        match code {
            5 => "access denied; check the network drive username and password",
            53 => "network path not found; check networkdrive_hostname",
            86 | 1326 => "logon failure: incorrect username or password",
            1219 => "the share is already connected under different credentials",
            1330 => "the password has expired",
            _ => "",
        }
    }
}

#[cfg(target_os = "windows")]
fn connect(share: &str, username: &str, password: &str) -> Result<(), NetworkDriveError> {
    let share_w = wnet::wide(share);
    let user_w = wnet::wide(username);
    let pass_w = wnet::wide(password);

    // A stale connection under other credentials makes the add fail with 1219.
    // SAFETY: share_w is null-terminated and outlives the call.
    unsafe {
        wnet::WNetCancelConnection2W(share_w.as_ptr(), 0, 1);
    }

    let resource = wnet::NetResourceW {
        dw_scope: 0,
        dw_type: wnet::RESOURCETYPE_DISK,
        dw_display_type: 0,
        dw_usage: 0,
        lp_local_name: std::ptr::null_mut(),
        lp_remote_name: share_w.as_ptr() as *mut u16,
        lp_comment: std::ptr::null_mut(),
        lp_provider: std::ptr::null_mut(),
    };

    // SAFETY: every pointer refers to a buffer that outlives the call, and
    // WNetAddConnection2W only reads through them.
    let rc = unsafe {
        wnet::WNetAddConnection2W(
            &resource,
            pass_w.as_ptr(),
            user_w.as_ptr(),
            wnet::CONNECT_TEMPORARY,
        )
    };

    if rc == 0 {
        tracing::info!(share, username, "Network drive connected");
        Ok(())
    } else {
        tracing::warn!(share, username, code = rc, "Network drive connection failed");
        Err(NetworkDriveError::Api {
            share: share.to_string(),
            code: rc,
            message: wnet::describe(rc).to_string(),
        })
    }
}

#[cfg(not(target_os = "windows"))]
fn connect(_share: &str, _username: &str, _password: &str) -> Result<(), NetworkDriveError> {
    Ok(())
}

#[cfg(target_os = "windows")]
fn disconnect(share: &str) {
    let share_w = wnet::wide(share);
    // SAFETY: share_w is null-terminated and outlives the call.
    let rc = unsafe { wnet::WNetCancelConnection2W(share_w.as_ptr(), 0, 1) };
    if rc == 0 {
        tracing::info!(share, "Network drive disconnected");
    } else {
        tracing::debug!(share, code = rc, "Network drive disconnect failed (ignored)");
    }
}

#[cfg(not(target_os = "windows"))]
fn disconnect(share: &str) {
    tracing::trace!(share, "Nothing to disconnect");
}

// =============================================================================
// Tests
// =============================================================================
