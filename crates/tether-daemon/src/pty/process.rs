//! A single pseudo-terminal-backed OS process
//!
//! Wraps one portable-pty pair plus its child process. The blocking master
//! reader is drained on a dedicated thread that forwards output and the
//! final exit notification over a broadcast channel.
//!
//! All handle operations are idempotent once the underlying process has
//! exited: write/resize/kill after exit are silent no-ops, never errors.

use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use portable_pty::{native_pty_system, CommandBuilder, MasterPty, PtySize};
use tokio::sync::broadcast;

use tether_core::SpawnError;
use tether_protocol::TerminalSize;

/// Minimum terminal width. Full-screen terminal apps misrender below this.
pub const MIN_COLS: u16 = 40;
/// Minimum terminal height
pub const MIN_ROWS: u16 = 10;

/// Clamp a requested size to the enforced floor
pub fn clamp_size(cols: u16, rows: u16) -> TerminalSize {
    TerminalSize {
        cols: cols.max(MIN_COLS),
        rows: rows.max(MIN_ROWS),
    }
}

/// Options for spawning a PTY process
#[derive(Debug, Clone)]
pub struct SpawnOptions {
    /// Program to run (the shell)
    pub command: PathBuf,
    /// Arguments for the program
    pub args: Vec<String>,
    /// Working directory
    pub cwd: PathBuf,
    /// Caller-supplied environment overrides, layered over the inherited
    /// environment. Forced terminal variables are applied after these.
    pub env: Vec<(String, String)>,
    /// Initial terminal size
    pub size: TerminalSize,
}

/// Output from a PTY process
#[derive(Debug, Clone)]
pub enum PtyEvent {
    /// Data read from the PTY master
    Data(Bytes),
    /// Process exited with optional exit code
    Exited { code: Option<i32> },
}

/// Validate spawn inputs before any process is started.
///
/// Failing here guarantees no partially-started process can leak.
pub fn validate_spawn(command: &Path, cwd: &Path) -> Result<(), SpawnError> {
    let meta = std::fs::metadata(command).map_err(|_| SpawnError::ShellNotFound {
        path: command.to_path_buf(),
    })?;
    if !meta.is_file() {
        return Err(SpawnError::ShellNotFound {
            path: command.to_path_buf(),
        });
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if meta.permissions().mode() & 0o111 == 0 {
            return Err(SpawnError::ShellNotExecutable {
                path: command.to_path_buf(),
            });
        }
    }

    match std::fs::metadata(cwd) {
        Ok(m) if m.is_dir() => Ok(()),
        _ => Err(SpawnError::CwdNotFound {
            path: cwd.to_path_buf(),
        }),
    }
}

/// Handle to a running PTY process
pub struct PtyProcess {
    /// Master side, kept for resize
    master: Mutex<Box<dyn MasterPty + Send>>,
    /// Writer to send data to the PTY
    writer: Mutex<Box<dyn Write + Send>>,
    /// Killer handle cloned from the child before it moved to the reader thread
    killer: Mutex<Box<dyn portable_pty::ChildKiller + Send + Sync>>,
    /// Set once the child has exited
    exited: Arc<AtomicBool>,
    /// Output/exit event fan-out
    events: broadcast::Sender<PtyEvent>,
    /// Process id of the child
    pid: Option<u32>,
}

impl PtyProcess {
    /// Validate options and spawn the process.
    ///
    /// The environment is layered: inherited process environment, then
    /// caller overrides, then forced terminal variables last so inherited
    /// values cannot disable them.
    pub fn spawn(options: SpawnOptions) -> Result<Self, SpawnError> {
        validate_spawn(&options.command, &options.cwd)?;

        let size = clamp_size(options.size.cols, options.size.rows);
        let pty_system = native_pty_system();
        let pair = pty_system
            .openpty(PtySize {
                rows: size.rows,
                cols: size.cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| SpawnError::Pty {
                command: options.command.display().to_string(),
                cwd: options.cwd.clone(),
                message: format!("Failed to open PTY: {}", e),
            })?;

        // CommandBuilder inherits the parent environment; overrides layer on
        // top, forced terminal variables go last.
        let mut cmd = CommandBuilder::new(&options.command);
        cmd.args(&options.args);
        cmd.cwd(&options.cwd);
        for (key, value) in &options.env {
            cmd.env(key, value);
        }
        cmd.env("TERM", "xterm-256color");
        cmd.env("COLORTERM", "truecolor");

        let mut child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|e| SpawnError::Pty {
                command: options.command.display().to_string(),
                cwd: options.cwd.clone(),
                message: format!("Failed to spawn: {}", e),
            })?;

        let pid = child.process_id();
        tracing::debug!("Spawned PTY process pid={:?}", pid);

        let killer = child.clone_killer();

        let reader = pair
            .master
            .try_clone_reader()
            .map_err(|e| SpawnError::Pty {
                command: options.command.display().to_string(),
                cwd: options.cwd.clone(),
                message: format!("Failed to clone PTY reader: {}", e),
            })?;

        let writer = pair.master.take_writer().map_err(|e| SpawnError::Pty {
            command: options.command.display().to_string(),
            cwd: options.cwd.clone(),
            message: format!("Failed to take PTY writer: {}", e),
        })?;

        let (events, _) = broadcast::channel(1024);
        let exited = Arc::new(AtomicBool::new(false));

        spawn_reader_thread(reader, child, events.clone(), Arc::clone(&exited));

        Ok(Self {
            master: Mutex::new(pair.master),
            writer: Mutex::new(writer),
            killer: Mutex::new(killer),
            exited,
            events,
            pid,
        })
    }

    /// Process id of the child, if known
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Whether the child has exited
    pub fn has_exited(&self) -> bool {
        self.exited.load(Ordering::SeqCst)
    }

    /// Subscribe to output and exit events
    pub fn subscribe(&self) -> broadcast::Receiver<PtyEvent> {
        self.events.subscribe()
    }

    /// Write bytes to the terminal. Silent no-op after exit.
    pub fn write(&self, data: &[u8]) {
        if self.has_exited() {
            return;
        }
        let mut writer = match self.writer.lock() {
            Ok(w) => w,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Err(e) = writer.write_all(data).and_then(|_| writer.flush()) {
            // The process may have exited between the check and the write
            tracing::debug!("PTY write dropped: {}", e);
        }
    }

    /// Resize the terminal, clamping to the enforced floor. Silent no-op
    /// after exit.
    pub fn resize(&self, cols: u16, rows: u16) {
        if self.has_exited() {
            return;
        }
        let size = clamp_size(cols, rows);
        let master = match self.master.lock() {
            Ok(m) => m,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Err(e) = master.resize(PtySize {
            rows: size.rows,
            cols: size.cols,
            pixel_width: 0,
            pixel_height: 0,
        }) {
            tracing::debug!("PTY resize dropped: {}", e);
        }
    }

    /// Kill the process. Silent no-op after exit.
    ///
    /// A specific signal is honored on Unix when a pid is known; otherwise
    /// the portable killer terminates the child.
    pub fn kill(&self, signal: Option<i32>) {
        if self.has_exited() {
            return;
        }

        #[cfg(unix)]
        if let (Some(sig), Some(pid)) = (signal, self.pid) {
            // Safety: plain kill(2) on a pid we spawned
            unsafe {
                libc::kill(pid as libc::pid_t, sig);
            }
            return;
        }
        #[cfg(not(unix))]
        let _ = signal;

        let mut killer = match self.killer.lock() {
            Ok(k) => k,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Err(e) = killer.kill() {
            tracing::debug!("PTY kill dropped: {}", e);
        }
    }
}

/// Drain the blocking reader on a dedicated thread, then reap the child.
fn spawn_reader_thread(
    mut reader: Box<dyn Read + Send>,
    mut child: Box<dyn portable_pty::Child + Send + Sync>,
    events: broadcast::Sender<PtyEvent>,
    exited: Arc<AtomicBool>,
) {
    std::thread::spawn(move || {
        let mut buf = [0u8; 8192];
        loop {
            match reader.read(&mut buf) {
                Ok(0) => break, // EOF, master closed
                Ok(n) => {
                    // No subscribers is fine; events are best-effort fan-out
                    let _ = events.send(PtyEvent::Data(Bytes::copy_from_slice(&buf[..n])));
                }
                Err(e) => {
                    tracing::debug!("PTY reader stopped: {}", e);
                    break;
                }
            }
        }

        let code = match child.wait() {
            Ok(status) => Some(status.exit_code() as i32),
            Err(e) => {
                tracing::warn!("Failed to reap PTY child: {}", e);
                None
            }
        };

        exited.store(true, Ordering::SeqCst);
        let _ = events.send(PtyEvent::Exited { code });
    });
}
