//! Process spawning and tube construction via `fork`/`exec`
//! (Component I).

use std::ffi::CString;
use std::io;
use std::os::raw::c_char;
use std::ptr;

use crate::error::AxiumError;
use crate::log::{log_debug, log_error, log_exception};

use super::Tube;

/// Which standard streams to redirect into pipes when spawning a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TubeFlags(u8);

impl TubeFlags {
    pub const STDIN: TubeFlags = TubeFlags(1 << 0);
    pub const STDOUT: TubeFlags = TubeFlags(1 << 1);
    pub const STDERR: TubeFlags = TubeFlags(1 << 2);
    pub const ALL: TubeFlags = TubeFlags(Self::STDIN.0 | Self::STDOUT.0 | Self::STDERR.0);

    pub fn contains(self, other: TubeFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for TubeFlags {
    type Output = TubeFlags;
    fn bitor(self, rhs: TubeFlags) -> TubeFlags {
        TubeFlags(self.0 | rhs.0)
    }
}

/// A pipe pair, close-on-exec by construction.
struct Pipe {
    read: i32,
    write: i32,
}

fn pipe_cloexec() -> io::Result<Pipe> {
    let mut fds = [0i32; 2];
    let result = unsafe { libc::pipe2(fds.as_mut_ptr(), libc::O_CLOEXEC) };
    if result == -1 {
        Err(io::Error::last_os_error())
    } else {
        Ok(Pipe {
            read: fds[0],
            write: fds[1],
        })
    }
}

fn to_cstrings(args: &[&str]) -> io::Result<Vec<CString>> {
    args.iter()
        .map(|s| {
            CString::new(*s)
                .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "argument contains NUL"))
        })
        .collect()
}

fn to_argv_ptrs(cstrings: &[CString]) -> Vec<*mut c_char> {
    let mut ptrs: Vec<*mut c_char> = cstrings.iter().map(|s| s.as_ptr() as *mut c_char).collect();
    ptrs.push(ptr::null_mut());
    ptrs
}

/// Spawns `argv[0]` with the given arguments, inheriting the parent's
/// environment, redirecting stdin, stdout, and stderr.
pub fn spawn(argv: &[&str]) -> Result<Tube, AxiumError> {
    spawn_ext(argv, None, TubeFlags::ALL)
}

/// Spawns a process with explicit stream redirection and an optional
/// replacement environment.
///
/// Uses the sync-pipe pattern: the child reports an `exec`/`dup2` failure
/// back to the parent over a close-on-exec pipe before calling `_exit`, so
/// the parent can distinguish "exec failed" from "process ran and exited"
/// without racing a `waitpid`.
pub fn spawn_ext(
    argv: &[&str],
    envp: Option<&[(&str, &str)]>,
    flags: TubeFlags,
) -> Result<Tube, AxiumError> {
    if argv.is_empty() {
        return Err(AxiumError::Exec(io::Error::new(
            io::ErrorKind::InvalidInput,
            "argv must have at least one element",
        )));
    }

    let argv_c = to_cstrings(argv).map_err(AxiumError::Exec)?;
    let argv_ptrs = to_argv_ptrs(&argv_c);

    let envp_c: Option<Vec<CString>> = envp
        .map(|pairs| {
            pairs
                .iter()
                .map(|(k, v)| CString::new(format!("{k}={v}")))
                .collect::<Result<Vec<_>, _>>()
        })
        .transpose()
        .map_err(|_| AxiumError::Exec(io::Error::new(io::ErrorKind::InvalidInput, "env contains NUL")))?;
    let envp_ptrs = envp_c.as_ref().map(|v| to_argv_ptrs(v));

    let p2c = if flags.contains(TubeFlags::STDIN) {
        Some(pipe_cloexec().map_err(AxiumError::Pipe)?)
    } else {
        None
    };
    let c2p = if flags.contains(TubeFlags::STDOUT) {
        Some(pipe_cloexec().map_err(AxiumError::Pipe)?)
    } else {
        None
    };
    let c2p_err = if flags.contains(TubeFlags::STDERR) {
        Some(pipe_cloexec().map_err(AxiumError::Pipe)?)
    } else {
        None
    };
    let sync_pipe = pipe_cloexec().map_err(AxiumError::Pipe)?;

    let pid = unsafe { libc::fork() };
    if pid == -1 {
        return Err(AxiumError::Fork(io::Error::last_os_error()));
    }

    if pid == 0 {
        unsafe {
            libc::close(sync_pipe.read);

            if let Some(p2c) = &p2c {
                libc::dup2(p2c.read, libc::STDIN_FILENO);
            }
            if let Some(c2p) = &c2p {
                libc::dup2(c2p.write, libc::STDOUT_FILENO);
            }
            if let Some(c2p_err) = &c2p_err {
                libc::dup2(c2p_err.write, libc::STDERR_FILENO);
            }

            match &envp_ptrs {
                Some(envp_ptrs) => {
                    libc::execvpe(
                        argv_ptrs[0],
                        argv_ptrs.as_ptr() as *const *const c_char,
                        envp_ptrs.as_ptr() as *const *const c_char,
                    );
                }
                None => {
                    libc::execvp(argv_ptrs[0], argv_ptrs.as_ptr() as *const *const c_char);
                }
            }

            let err = io::Error::last_os_error().raw_os_error().unwrap_or(libc::EINVAL);
            libc::write(
                sync_pipe.write,
                &err as *const i32 as *const libc::c_void,
                std::mem::size_of::<i32>(),
            );
            libc::_exit(127);
        }
    }

    unsafe {
        libc::close(sync_pipe.write);
        if let Some(p2c) = &p2c {
            libc::close(p2c.read);
        }
        if let Some(c2p) = &c2p {
            libc::close(c2p.write);
        }
        if let Some(c2p_err) = &c2p_err {
            libc::close(c2p_err.write);
        }
    }

    let mut errno_buf = 0i32;
    let n = unsafe {
        libc::read(
            sync_pipe.read,
            &mut errno_buf as *mut i32 as *mut libc::c_void,
            std::mem::size_of::<i32>(),
        )
    };
    unsafe { libc::close(sync_pipe.read) };

    if n as usize == std::mem::size_of::<i32>() {
        let err = io::Error::from_raw_os_error(errno_buf);
        log_error!("Child failed to exec {:?}: {err}", argv);
        unsafe { libc::waitpid(pid, ptr::null_mut(), 0) };
        return Err(AxiumError::Exec(err));
    } else if n < 0 {
        log_exception!("Failed to read sync pipe while spawning {:?}", argv);
        unsafe { libc::waitpid(pid, ptr::null_mut(), 0) };
        return Err(AxiumError::Pipe(io::Error::last_os_error()));
    }

    log_debug!("Spawned pid {pid}: {:?}", argv);

    Ok(Tube::from_process(
        p2c.map(|p| p.write).unwrap_or(-1),
        c2p.map(|p| p.read).unwrap_or(-1),
        c2p_err.map(|p| p.read).unwrap_or(-1),
        pid,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_combine_with_bitor() {
        let both = TubeFlags::STDIN | TubeFlags::STDOUT;
        assert!(both.contains(TubeFlags::STDIN));
        assert!(both.contains(TubeFlags::STDOUT));
        assert!(!both.contains(TubeFlags::STDERR));
    }

    #[test]
    fn all_contains_every_stream() {
        assert!(TubeFlags::ALL.contains(TubeFlags::STDIN));
        assert!(TubeFlags::ALL.contains(TubeFlags::STDOUT));
        assert!(TubeFlags::ALL.contains(TubeFlags::STDERR));
    }

    #[test]
    fn spawn_true_succeeds_and_exits_cleanly() {
        let mut tube = spawn(&["true"]).expect("spawn true");
        let status = tube.wait();
        assert!(status.is_some());
    }

    #[test]
    fn spawn_nonexistent_binary_fails() {
        let result = spawn(&["__axium_does_not_exist__"]);
        assert!(result.is_err());
    }

    #[test]
    fn spawn_echo_round_trips_stdout() {
        let mut tube = spawn(&["echo", "hello axium"]).expect("spawn echo");
        let line = tube.recvline(crate::timeout::DEFAULT).expect("recvline");
        assert_eq!(line, b"hello axium\n");
    }
}
