//! Linux TUN tunnel provider.
//!
//! Creates and configures the interface with the `tun` crate, or adopts a
//! descriptor the platform has already opened (as Android's
//! `VpnService.establish()` hands out). Reads wait with `poll(2)` so the filter
//! loop can notice a stop request between packets.

#![allow(unsafe_code)]

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::os::fd::{AsRawFd, BorrowedFd, FromRawFd, IntoRawFd, OwnedFd, RawFd};
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tracing::info;
use tun::Device as _;

use super::{TunnelDevice, TunnelHandle, TunnelProvider};
use crate::config::TunnelConfig;
use crate::constants;
use crate::error::{InitError, TunnelError};

/// Returns `true` when running with an effective UID of 0.
#[must_use]
pub fn is_root() -> bool {
    // SAFETY: geteuid has no preconditions and cannot fail.
    unsafe { libc::geteuid() == 0 }
}

/// Duplicates a descriptor owned by someone else.
fn duplicate(fd: RawFd) -> io::Result<OwnedFd> {
    // SAFETY: the borrow only lives for the duplicate call; a closed fd makes
    // the call fail with EBADF instead of touching another resource.
    unsafe { BorrowedFd::borrow_raw(fd) }.try_clone_to_owned()
}

/// Opens tunnels according to a [`TunnelConfig`].
pub struct TunProvider {
    config: TunnelConfig,
}

impl TunProvider {
    /// Creates a provider for `config`.
    #[must_use]
    pub fn new(config: TunnelConfig) -> Self {
        Self { config }
    }

    fn device_config(&self) -> tun::Configuration {
        let mut config = tun::Configuration::default();
        if !self.config.name.is_empty() {
            config.name(&self.config.name);
        }
        config
            .address(self.config.address)
            .netmask(self.config.netmask)
            .mtu(i32::from(self.config.mtu))
            .up();
        #[cfg(target_os = "linux")]
        config.platform(|platform| {
            platform.packet_information(false);
        });
        config
    }

    fn adopt_fd(&self, fd: RawFd) -> Result<TunnelHandle, TunnelError> {
        let owned = duplicate(fd).map_err(TunnelError::Establish)?;

        let name = if self.config.name.is_empty() {
            constants::INHERITED_TUN_NAME.to_string()
        } else {
            self.config.name.clone()
        };
        info!(interface = %name, fd, "Adopted platform tunnel descriptor");
        Ok(Arc::new(TunDevice::new(name, File::from(owned))))
    }

    fn create_device(&self) -> Result<TunnelHandle, TunnelError> {
        let device = tun::create(&self.device_config()).map_err(|e| TunnelError::Configure {
            interface: self.config.name.clone(),
            message: e.to_string(),
        })?;
        let name = device.name().to_string();

        // SAFETY: `into_raw_fd` hands over sole ownership of the queue descriptor.
        let file = unsafe { File::from_raw_fd(device.into_raw_fd()) };
        info!(
            interface = %name,
            address = %self.config.address,
            netmask = %self.config.netmask,
            mtu = self.config.mtu,
            "TUN device created and configured"
        );
        Ok(Arc::new(TunDevice::new(name, file)))
    }
}

impl TunnelProvider for TunProvider {
    fn check_permission(&self) -> Result<(), InitError> {
        if let Some(fd) = self.config.fd {
            return duplicate(fd).map(drop).map_err(|e| {
                InitError::Unavailable(format!("inherited descriptor {fd} is not usable: {e}"))
            });
        }

        if !Path::new(constants::TUN_CLONE_DEVICE).exists() {
            return Err(InitError::Unavailable(format!(
                "{} not found",
                constants::TUN_CLONE_DEVICE
            )));
        }
        if !is_root() {
            return Err(InitError::PermissionDenied(
                "creating a TUN interface requires root".to_string(),
            ));
        }
        OpenOptions::new()
            .read(true)
            .write(true)
            .open(constants::TUN_CLONE_DEVICE)
            .map(drop)
            .map_err(|e| match e.kind() {
                io::ErrorKind::PermissionDenied => InitError::PermissionDenied(e.to_string()),
                _ => InitError::Unavailable(e.to_string()),
            })
    }

    fn establish(&self) -> Result<TunnelHandle, TunnelError> {
        match self.config.fd {
            Some(fd) => self.adopt_fd(fd),
            None => self.create_device(),
        }
    }
}

/// An open TUN interface.
///
/// Reads and writes share the descriptor; `close` waits for in-flight I/O and
/// then releases it.
pub struct TunDevice {
    name: String,
    file: RwLock<Option<File>>,
}

impl TunDevice {
    fn new(name: String, file: File) -> Self {
        Self {
            name,
            file: RwLock::new(Some(file)),
        }
    }
}

fn closed() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "tunnel closed")
}

/// Waits until `file` is readable. `Ok(false)` on timeout.
fn wait_readable(file: &File, timeout: Duration) -> io::Result<bool> {
    let mut pfd = libc::pollfd {
        fd: file.as_raw_fd(),
        events: libc::POLLIN,
        revents: 0,
    };
    let timeout_ms = libc::c_int::try_from(timeout.as_millis()).unwrap_or(libc::c_int::MAX);
    // SAFETY: `pfd` is a single valid pollfd for the duration of the call.
    let rc = unsafe { libc::poll(&mut pfd, 1, timeout_ms) };
    if rc < 0 {
        let err = io::Error::last_os_error();
        return if err.kind() == io::ErrorKind::Interrupted {
            Ok(false)
        } else {
            Err(err)
        };
    }
    if rc > 0 && pfd.revents & (libc::POLLERR | libc::POLLNVAL) != 0 {
        return Err(io::Error::new(io::ErrorKind::BrokenPipe, "poll reported an error"));
    }
    Ok(rc > 0)
}

impl TunnelDevice for TunDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn read_packet(&self, buf: &mut [u8], timeout: Duration) -> io::Result<Option<usize>> {
        let guard = self.file.read().unwrap_or_else(PoisonError::into_inner);
        let file = guard.as_ref().ok_or_else(closed)?;

        if !wait_readable(file, timeout)? {
            return Ok(None);
        }
        match (&*file).read(buf)? {
            0 => Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("tunnel {} hung up", self.name),
            )),
            n => Ok(Some(n)),
        }
    }

    fn write_packet(&self, packet: &[u8]) -> io::Result<usize> {
        let guard = self.file.read().unwrap_or_else(PoisonError::into_inner);
        let file = guard.as_ref().ok_or_else(closed)?;
        (&*file).write(packet)
    }

    fn close(&self) -> io::Result<()> {
        let file = self
            .file
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if file.is_some() {
            drop(file);
            info!(interface = %self.name, "TUN device closed");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pipe() -> (RawFd, RawFd) {
        let mut fds = [0; 2];
        // SAFETY: `fds` has room for the two descriptors pipe writes.
        assert_eq!(unsafe { libc::pipe(fds.as_mut_ptr()) }, 0);
        (fds[0], fds[1])
    }

    fn close_fd(fd: RawFd) {
        // SAFETY: the test owns `fd` and closes it once.
        unsafe { libc::close(fd) };
    }

    #[test]
    fn test_closed_inherited_fd_fails_permission_check() {
        let provider = TunProvider::new(TunnelConfig {
            fd: Some(987_654),
            ..TunnelConfig::default()
        });
        assert!(matches!(
            provider.check_permission(),
            Err(InitError::Unavailable(_))
        ));
        assert!(matches!(provider.establish(), Err(TunnelError::Establish(_))));
    }

    #[test]
    fn test_adopted_descriptor_reads_and_closes() {
        let (read_end, write_end) = pipe();

        let provider = TunProvider::new(TunnelConfig {
            name: String::new(),
            fd: Some(read_end),
            ..TunnelConfig::default()
        });
        provider.check_permission().unwrap();
        let tunnel = provider.establish().unwrap();
        assert_eq!(tunnel.name(), constants::INHERITED_TUN_NAME);

        let mut buf = [0u8; 16];
        assert_eq!(
            tunnel.read_packet(&mut buf, Duration::from_millis(10)).unwrap(),
            None
        );

        // SAFETY: `write_end` is an open pipe end owned by this test.
        assert_eq!(unsafe { libc::write(write_end, b"ping".as_ptr().cast(), 4) }, 4);
        let n = tunnel
            .read_packet(&mut buf, Duration::from_millis(500))
            .unwrap();
        assert_eq!(n, Some(4));
        assert_eq!(&buf[..4], b"ping");

        tunnel.close().unwrap();
        tunnel.close().unwrap();
        assert!(tunnel.read_packet(&mut buf, Duration::from_millis(1)).is_err());

        close_fd(read_end);
        close_fd(write_end);
    }

    #[test]
    fn test_hangup_is_reported_as_error() {
        let (read_end, write_end) = pipe();
        let provider = TunProvider::new(TunnelConfig {
            fd: Some(read_end),
            ..TunnelConfig::default()
        });
        let tunnel = provider.establish().unwrap();
        close_fd(write_end);

        let mut buf = [0u8; 16];
        assert!(tunnel.read_packet(&mut buf, Duration::from_millis(100)).is_err());
        close_fd(read_end);
    }
}
