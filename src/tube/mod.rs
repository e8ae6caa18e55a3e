//! Bidirectional process/network communication channel (Component H).

pub mod proc;
pub mod process;

pub use process::{spawn, spawn_ext, TubeFlags};

use std::io;
use std::os::unix::io::RawFd;

use crate::log::{log_debug, log_info};
use crate::timeout;

const INITIAL_RECVUNTIL_CAPACITY: usize = 1024;
const INITIAL_RECVALL_CAPACITY: usize = 4096;

/// A communication channel wrapping a process's (or, in principle, a
/// network connection's) stdin/stdout/stderr file descriptors.
pub struct Tube {
    read_fd: RawFd,
    write_fd: RawFd,
    stderr_fd: RawFd,
    pid: i32,
    /// Default timeout used when a caller passes [`timeout::DEFAULT`].
    pub default_timeout: f64,
}

impl Tube {
    pub(crate) fn from_process(write_fd: RawFd, read_fd: RawFd, stderr_fd: RawFd, pid: i32) -> Self {
        Tube {
            read_fd,
            write_fd,
            stderr_fd,
            pid,
            default_timeout: timeout::FOREVER,
        }
    }

    pub fn pid(&self) -> i32 {
        self.pid
    }

    pub fn stdin_fd(&self) -> RawFd {
        self.write_fd
    }

    pub fn stdout_fd(&self) -> RawFd {
        self.read_fd
    }

    pub fn stderr_fd(&self) -> RawFd {
        self.stderr_fd
    }

    fn raw_send(&mut self, data: &[u8]) -> io::Result<usize> {
        if self.write_fd == -1 {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "tube stdin is closed"));
        }
        let mut total = 0;
        while total < data.len() {
            let n = unsafe {
                libc::write(
                    self.write_fd,
                    data[total..].as_ptr() as *const libc::c_void,
                    data.len() - total,
                )
            };
            if n < 0 {
                let err = io::Error::last_os_error();
                if err.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                return Err(err);
            }
            total += n as usize;
        }
        Ok(total)
    }

    /// Sends raw bytes.
    pub fn send(&mut self, data: &[u8]) -> io::Result<usize> {
        let n = self.raw_send(data)?;
        log_debug!("Sent {n} bytes");
        Ok(n)
    }

    /// Sends bytes followed by a newline.
    pub fn sendline(&mut self, data: &[u8]) -> io::Result<usize> {
        let mut buf = Vec::with_capacity(data.len() + 1);
        buf.extend_from_slice(data);
        buf.push(b'\n');
        self.send(&buf)
    }

    fn poll_readable(fd: RawFd, deadline: Option<f64>) -> io::Result<bool> {
        let remaining = timeout::remaining(deadline);
        if let Some(r) = remaining {
            if r <= 0.0 {
                return Ok(false);
            }
        }
        let millis = timeout::poll_millis(remaining);
        let mut pfd = libc::pollfd {
            fd,
            events: libc::POLLIN,
            revents: 0,
        };
        loop {
            let r = unsafe { libc::poll(&mut pfd, 1, millis) };
            if r < 0 {
                let err = io::Error::last_os_error();
                if err.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                return Err(err);
            }
            return Ok(r > 0 && (pfd.revents & (libc::POLLIN | libc::POLLHUP)) != 0);
        }
    }

    fn raw_recv(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            let n = unsafe {
                libc::read(self.read_fd, buf.as_mut_ptr() as *mut libc::c_void, buf.len())
            };
            if n < 0 {
                let err = io::Error::last_os_error();
                if err.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                return Err(err);
            }
            return Ok(n as usize);
        }
    }

    /// Receives up to `buf.len()` bytes. Returns `0` on timeout or EOF,
    /// `Err` on a genuine I/O error.
    pub fn recv(&mut self, buf: &mut [u8], timeout_s: f64) -> io::Result<usize> {
        if self.read_fd == -1 {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "tube stdout is closed"));
        }
        let resolved = timeout::resolve(timeout_s, self.default_timeout);
        let deadline = timeout::deadline(resolved);
        if !Self::poll_readable(self.read_fd, deadline)? {
            return Ok(0);
        }
        let n = self.raw_recv(buf)?;
        if n > 0 {
            log_debug!("Received {n} bytes");
        }
        Ok(n)
    }

    /// Receives bytes one at a time until `delim` is seen (inclusive) or
    /// the timeout expires. Returns `None` on timeout or EOF before any
    /// match.
    pub fn recvuntil(&mut self, delim: &[u8], timeout_s: f64) -> Option<Vec<u8>> {
        if self.read_fd == -1 || delim.is_empty() {
            return None;
        }
        let resolved = timeout::resolve(timeout_s, self.default_timeout);
        let deadline = timeout::deadline(resolved);

        let mut out = Vec::with_capacity(INITIAL_RECVUNTIL_CAPACITY);
        let mut byte = [0u8; 1];

        loop {
            match Self::poll_readable(self.read_fd, deadline) {
                Ok(true) => {}
                _ => break,
            }
            let n = match self.raw_recv(&mut byte) {
                Ok(n) => n,
                Err(_) => break,
            };
            if n == 0 {
                break;
            }
            out.push(byte[0]);
            if out.len() >= delim.len() && &out[out.len() - delim.len()..] == delim {
                log_debug!("Received until delimiter: {} bytes", out.len());
                return Some(out);
            }
        }

        if out.is_empty() {
            None
        } else {
            Some(out)
        }
    }

    /// Receives one line, delimiter `\n` inclusive.
    pub fn recvline(&mut self, timeout_s: f64) -> Option<Vec<u8>> {
        self.recvuntil(b"\n", timeout_s)
    }

    /// Receives up to `numlines` lines, stopping early on timeout/EOF. All
    /// `numlines` lines share a single deadline rather than each restarting
    /// the full timeout.
    pub fn recvlines(&mut self, numlines: usize, timeout_s: f64) -> Vec<Vec<u8>> {
        let resolved = timeout::resolve(timeout_s, self.default_timeout);
        let deadline = timeout::deadline(resolved);
        let mut lines = Vec::with_capacity(numlines);
        for _ in 0..numlines {
            let remaining = match timeout::remaining(deadline) {
                None => timeout::FOREVER,
                Some(r) if r <= 0.0 => break,
                Some(r) => r,
            };
            match self.recvline(remaining) {
                Some(line) => lines.push(line),
                None => break,
            }
        }
        lines
    }

    /// Drains the channel until EOF, then closes it, returning everything
    /// read.
    pub fn recvall(&mut self, timeout_s: f64) -> Vec<u8> {
        let resolved = timeout::resolve(timeout_s, self.default_timeout);
        let deadline = timeout::deadline(resolved);
        let mut out = Vec::with_capacity(INITIAL_RECVALL_CAPACITY);
        let mut chunk = [0u8; 4096];

        if self.read_fd != -1 {
            loop {
                match Self::poll_readable(self.read_fd, deadline) {
                    Ok(true) => {}
                    _ => break,
                }
                match self.raw_recv(&mut chunk) {
                    Ok(0) | Err(_) => break,
                    Ok(n) => out.extend_from_slice(&chunk[..n]),
                }
            }
        }

        self.close();
        out
    }

    /// Receives until `delim`, then sends `data`. Returns whatever was
    /// received while waiting.
    pub fn sendafter(&mut self, delim: &[u8], data: &[u8], timeout_s: f64) -> Option<Vec<u8>> {
        let res = self.recvuntil(delim, timeout_s);
        let _ = self.send(data);
        res
    }

    /// Like [`Tube::sendafter`], appending a newline to `data`.
    pub fn sendlineafter(&mut self, delim: &[u8], data: &[u8], timeout_s: f64) -> Option<Vec<u8>> {
        let res = self.recvuntil(delim, timeout_s);
        let _ = self.sendline(data);
        res
    }

    /// Sends `data`, then receives until `delim`.
    pub fn sendthen(&mut self, delim: &[u8], data: &[u8], timeout_s: f64) -> Option<Vec<u8>> {
        let _ = self.send(data);
        self.recvuntil(delim, timeout_s)
    }

    /// Like [`Tube::sendthen`], appending a newline to `data`.
    pub fn sendlinethen(&mut self, delim: &[u8], data: &[u8], timeout_s: f64) -> Option<Vec<u8>> {
        let _ = self.sendline(data);
        self.recvuntil(delim, timeout_s)
    }

    /// Closes the child's stdin pipe, signalling EOF to the process.
    pub fn close_stdin(&mut self) {
        if self.write_fd != -1 {
            unsafe { libc::close(self.write_fd) };
            self.write_fd = -1;
        }
    }

    pub fn close_stdout(&mut self) {
        if self.read_fd != -1 {
            unsafe { libc::close(self.read_fd) };
            self.read_fd = -1;
        }
    }

    pub fn close_stderr(&mut self) {
        if self.stderr_fd != -1 {
            unsafe { libc::close(self.stderr_fd) };
            self.stderr_fd = -1;
        }
    }

    /// Closes every open stream. Does not reap the child; call [`Tube::wait`]
    /// for that.
    pub fn close(&mut self) {
        self.close_stdin();
        self.close_stdout();
        self.close_stderr();
    }

    /// Blocks until the child process exits, returning its exit status (or
    /// `None` if it was never a process tube, or the pid is no longer a
    /// child of this process).
    pub fn wait(&mut self) -> Option<i32> {
        if self.pid <= 0 {
            return None;
        }
        let mut status = 0i32;
        let r = unsafe { libc::waitpid(self.pid, &mut status, 0) };
        if r == -1 {
            None
        } else {
            log_info!("Process {} exited with status {status}", self.pid);
            Some(status)
        }
    }
}

impl Drop for Tube {
    fn drop(&mut self) {
        self.close();
        if self.pid > 0 {
            unsafe { libc::waitpid(self.pid, std::ptr::null_mut(), 0) };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recv_on_closed_stdout_is_error() {
        let mut t = Tube::from_process(-1, -1, -1, -1);
        let mut buf = [0u8; 16];
        assert!(t.recv(&mut buf, timeout::FOREVER).is_err());
    }

    #[test]
    fn recvuntil_empty_delim_is_none() {
        let mut t = spawn(&["cat"]).expect("spawn cat");
        assert!(t.recvuntil(b"", timeout::FOREVER).is_none());
    }

    #[test]
    fn send_recv_round_trip_through_cat() {
        let mut t = spawn(&["cat"]).expect("spawn cat");
        t.sendline(b"hello axium").expect("send");
        let line = t.recvline(2.0).expect("recvline");
        assert_eq!(line, b"hello axium\n");
    }

    #[test]
    fn recvuntil_multi_byte_delimiter() {
        let mut t = spawn(&["printf", "a-b-STOPc-d"]).expect("spawn printf");
        let data = t.recvuntil(b"STOP", 2.0).expect("recvuntil");
        assert_eq!(data, b"a-b-STOP");
    }

    #[test]
    fn recvall_drains_and_closes() {
        let mut t = spawn(&["echo", "all of it"]).expect("spawn echo");
        let data = t.recvall(2.0);
        assert_eq!(data, b"all of it\n");
        assert_eq!(t.stdout_fd(), -1);
    }

    #[test]
    fn sendlineafter_returns_prompt_and_sends() {
        let mut t = spawn(&["sh", "-c", "printf 'prompt> '; cat"]).expect("spawn sh");
        let prompt = t.sendlineafter(b"> ", b"echoed", 2.0).expect("prompt");
        assert_eq!(prompt, b"prompt> ");
        let line = t.recvline(2.0).expect("recvline");
        assert_eq!(line, b"echoed\n");
    }

    #[test]
    fn recv_times_out_on_idle_channel() {
        let mut t = spawn(&["sleep", "5"]).expect("spawn sleep");
        let mut buf = [0u8; 16];
        let n = t.recv(&mut buf, 0.05).expect("recv");
        assert_eq!(n, 0);
    }

    #[test]
    fn wait_reports_exit_status() {
        let mut t = spawn(&["true"]).expect("spawn true");
        let status = t.wait().expect("wait");
        assert_eq!(libc::WEXITSTATUS(status), 0);
    }
}
