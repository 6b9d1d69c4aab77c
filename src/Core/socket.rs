// Generic netlink socket backend for Linux
// Uses a raw AF_NETLINK/NETLINK_GENERIC socket plus a self-pipe for wakeups

use std::fmt::Debug;
use std::io;
use std::sync::Arc;

/// Kernel notification transport: moves whole netlink datagrams.
///
/// Implementations must be shareable so a shutdown handle can call
/// [`interrupt`](NetlinkTransport::interrupt) while another thread is
/// blocked in [`recv`](NetlinkTransport::recv).
pub trait NetlinkTransport: Send + Sync + Debug {
    /// Send one datagram to the kernel.
    fn send(&self, buf: &[u8]) -> io::Result<()>;

    /// Block until a datagram arrives and copy it into `buf`.
    ///
    /// # Returns
    /// * `Ok(n)` - number of bytes written to `buf`
    /// * `Err(e)` with `ErrorKind::Interrupted` once `interrupt` was called
    /// * `Err(e)` with `ErrorKind::InvalidData` if the datagram did not fit
    fn recv(&self, buf: &mut [u8]) -> io::Result<usize>;

    /// Subscribe to a multicast group.
    fn join_group(&self, group: u32) -> io::Result<()>;

    /// Port id the kernel assigned to this socket.
    fn local_port(&self) -> u32;

    /// Wake any blocked `recv` and make every later `recv` fail with
    /// `ErrorKind::Interrupted`.
    fn interrupt(&self) -> io::Result<()>;
}

/// Open a generic netlink socket bound to a kernel-assigned port.
#[cfg(target_os = "linux")]
pub fn open_transport() -> io::Result<Arc<dyn NetlinkTransport>> {
    Ok(Arc::new(LinuxNetlinkSocket::open()?))
}

#[cfg(not(target_os = "linux"))]
pub fn open_transport() -> io::Result<Arc<dyn NetlinkTransport>> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "Generic netlink only supported on Linux",
    ))
}

#[cfg(target_os = "linux")]
use std::os::unix::io::RawFd;

#[cfg(target_os = "linux")]
#[derive(Debug)]
pub struct LinuxNetlinkSocket {
    fd: RawFd,
    port: u32,
    // [read end, write end]
    wake: [RawFd; 2],
}

#[cfg(target_os = "linux")]
impl LinuxNetlinkSocket {
    pub fn open() -> io::Result<Self> {
        let fd = unsafe {
            libc::socket(
                libc::AF_NETLINK,
                libc::SOCK_RAW | libc::SOCK_CLOEXEC,
                libc::NETLINK_GENERIC,
            )
        };
        if fd < 0 {
            return Err(io::Error::last_os_error());
        }

        let mut wake = [-1; 2];
        if unsafe { libc::pipe2(wake.as_mut_ptr(), libc::O_CLOEXEC | libc::O_NONBLOCK) } != 0 {
            let err = io::Error::last_os_error();
            unsafe { libc::close(fd) };
            return Err(err);
        }

        // From here on Drop closes every descriptor.
        let mut sock = Self { fd, port: 0, wake };

        let mut addr = sockaddr_nl(0);
        let addr_len = std::mem::size_of::<libc::sockaddr_nl>() as libc::socklen_t;
        if unsafe {
            libc::bind(
                sock.fd,
                &addr as *const libc::sockaddr_nl as *const libc::sockaddr,
                addr_len,
            )
        } != 0
        {
            return Err(io::Error::last_os_error());
        }

        let mut len = addr_len;
        if unsafe {
            libc::getsockname(
                sock.fd,
                &mut addr as *mut libc::sockaddr_nl as *mut libc::sockaddr,
                &mut len,
            )
        } != 0
        {
            return Err(io::Error::last_os_error());
        }
        sock.port = addr.nl_pid;

        Ok(sock)
    }

    /// Wait until either the socket or the wake pipe is readable.
    fn wait_readable(&self) -> io::Result<()> {
        let mut fds = [
            libc::pollfd {
                fd: self.fd,
                events: libc::POLLIN,
                revents: 0,
            },
            libc::pollfd {
                fd: self.wake[0],
                events: libc::POLLIN,
                revents: 0,
            },
        ];

        loop {
            let rc = unsafe { libc::poll(fds.as_mut_ptr(), fds.len() as libc::nfds_t, -1) };
            if rc < 0 {
                let err = io::Error::last_os_error();
                if err.raw_os_error() == Some(libc::EINTR) {
                    continue;
                }
                return Err(err);
            }

            // The pipe is never drained, so an interrupt stays visible.
            if fds[1].revents != 0 {
                return Err(io::Error::new(
                    io::ErrorKind::Interrupted,
                    "netlink receive interrupted",
                ));
            }
            if fds[0].revents != 0 {
                return Ok(());
            }
        }
    }
}

#[cfg(target_os = "linux")]
fn sockaddr_nl(pid: u32) -> libc::sockaddr_nl {
    let mut addr: libc::sockaddr_nl = unsafe { std::mem::zeroed() };
    addr.nl_family = libc::AF_NETLINK as libc::sa_family_t;
    addr.nl_pid = pid;
    addr
}

#[cfg(target_os = "linux")]
impl NetlinkTransport for LinuxNetlinkSocket {
    fn send(&self, buf: &[u8]) -> io::Result<()> {
        // Port 0 is the kernel.
        let dest = sockaddr_nl(0);
        loop {
            let rc = unsafe {
                libc::sendto(
                    self.fd,
                    buf.as_ptr() as *const libc::c_void,
                    buf.len(),
                    0,
                    &dest as *const libc::sockaddr_nl as *const libc::sockaddr,
                    std::mem::size_of::<libc::sockaddr_nl>() as libc::socklen_t,
                )
            };
            if rc >= 0 {
                return Ok(());
            }
            let err = io::Error::last_os_error();
            if err.raw_os_error() != Some(libc::EINTR) {
                return Err(err);
            }
        }
    }

    fn recv(&self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            self.wait_readable()?;

            let rc = unsafe {
                libc::recv(
                    self.fd,
                    buf.as_mut_ptr() as *mut libc::c_void,
                    buf.len(),
                    libc::MSG_TRUNC | libc::MSG_DONTWAIT,
                )
            };
            if rc < 0 {
                let err = io::Error::last_os_error();
                match err.raw_os_error() {
                    Some(libc::EINTR) | Some(libc::EAGAIN) => continue,
                    _ => return Err(err),
                }
            }

            let n = rc as usize;
            if n > buf.len() {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("netlink datagram truncated ({} > {})", n, buf.len()),
                ));
            }
            return Ok(n);
        }
    }

    fn join_group(&self, group: u32) -> io::Result<()> {
        let rc = unsafe {
            libc::setsockopt(
                self.fd,
                libc::SOL_NETLINK,
                libc::NETLINK_ADD_MEMBERSHIP,
                &group as *const u32 as *const libc::c_void,
                std::mem::size_of::<u32>() as libc::socklen_t,
            )
        };
        if rc != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    fn local_port(&self) -> u32 {
        self.port
    }

    fn interrupt(&self) -> io::Result<()> {
        let byte = 1u8;
        let rc = unsafe { libc::write(self.wake[1], &byte as *const u8 as *const libc::c_void, 1) };
        if rc < 0 {
            let err = io::Error::last_os_error();
            // A full pipe already wakes the reader.
            if err.raw_os_error() != Some(libc::EAGAIN) {
                return Err(err);
            }
        }
        Ok(())
    }
}

#[cfg(target_os = "linux")]
impl Drop for LinuxNetlinkSocket {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.fd);
            libc::close(self.wake[0]);
            libc::close(self.wake[1]);
        }
    }
}
