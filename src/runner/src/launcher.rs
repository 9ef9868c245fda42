// Spawns a complete reduction group on the local machine:
//
// $ launch -n 5 -o output
//
// starts one controller and five workers as child processes, hands each its
// environment, and redirects per-process stdout/stderr into the output
// directory. Ctrl-C tears the whole group down.

use std::process::Command;

use structopt::StructOpt;

#[derive(Debug, StructOpt)]
#[structopt(name = "launch", about = "Launcher of a local fan-in reduction group.")]
struct Opt {
    /// Number of worker processes in the group
    #[structopt(short = "n", long = "num-workers", default_value = "4")]
    num_workers: usize,

    /// Address the controller binds to
    #[structopt(long = "controller-uri", default_value = "127.0.0.1:9900")]
    controller_uri: String,

    /// Output directory of log files
    #[structopt(short = "o", long = "output", default_value = "output")]
    output: std::path::PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Role {
    Controller,
    Worker,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Controller => write!(f, "controller"),
            Self::Worker => write!(f, "worker"),
        }
    }
}

fn sibling_binary(name: &str) -> std::path::PathBuf {
    let me = std::env::current_exe().expect("current_exe");
    me.parent()
        .unwrap_or_else(|| panic!("no parent directory for {:?}", me))
        .join(name)
}

fn open_or_create_append<P: AsRef<std::path::Path>>(path: P) -> std::fs::File {
    std::fs::OpenOptions::new()
        .append(true)
        .create(true)
        .open(&path)
        .unwrap_or_else(|e| panic!("fail to open or create {:?}: {}", path.as_ref(), e))
}

fn start_process(opt: &Opt, index: usize, role: Role) -> impl FnOnce() {
    let output_dir = opt.output.clone();
    let controller_uri = opt.controller_uri.clone();
    let num_workers = opt.num_workers;

    move || {
        let scope = match role {
            Role::Controller => role.to_string(),
            Role::Worker => format!("{}_{}", role, index),
        };

        let stdout_file = output_dir.join(format!("{}.log", scope)).with_extension("stdout");
        let stderr_file = output_dir.join(format!("{}.log", scope)).with_extension("stderr");

        let stdout = open_or_create_append(stdout_file);
        let stderr = open_or_create_append(stderr_file);

        let mut cmd = Command::new(sibling_binary(&role.to_string()));
        cmd.stdout(stdout).stderr(stderr);
        cmd.env(runner::CONTROLLER_URI_ENV, &controller_uri)
            .env(runner::GROUP_SIZE_ENV, num_workers.to_string())
            .env(runner::LOG_SCOPE_ENV, &scope);

        log::debug!("spawning {}", scope);
        let mut child = cmd.spawn().expect("failed to spawn a group process");

        use std::os::unix::process::ExitStatusExt; // for status.signal()
        loop {
            match child.try_wait() {
                Ok(Some(status)) => {
                    if !status.success() {
                        match status.code() {
                            Some(code) => log::error!("{} exited with code {}", scope, code),
                            None => log::error!(
                                "{} terminated by signal {}",
                                scope,
                                status.signal().unwrap()
                            ),
                        }
                    }
                    break;
                }
                Ok(None) => {
                    log::trace!("{} not finished yet, sleep for 5 ms", scope);
                    std::thread::sleep(std::time::Duration::from_millis(5));
                }
                Err(e) => {
                    panic!("lost track of {}: {}", scope, e);
                }
            }
            if TERMINATE.load(SeqCst) {
                log::warn!("killing {}", scope);
                child
                    .kill()
                    .unwrap_or_else(|e| panic!("failed to kill {}: {}", scope, e));
            }
        }
    }
}

fn submit(opt: Opt) -> anyhow::Result<()> {
    // create or clean the output directory
    let output_dir = &opt.output;
    if output_dir.exists() {
        std::fs::remove_dir_all(output_dir)?;
    }
    std::fs::create_dir_all(output_dir)?;

    let mut handles = vec![];
    handles.push(std::thread::spawn(start_process(&opt, 0, Role::Controller)));

    // workers retry their controller connection, so no startup ordering is
    // needed beyond spawning the controller first
    for i in 0..opt.num_workers {
        handles.push(std::thread::spawn(start_process(&opt, i, Role::Worker)));
    }

    for h in handles {
        h.join()
            .unwrap_or_else(|e| panic!("failed to join a supervisor thread: {:?}", e));
    }

    Ok(())
}

use nix::sys::signal;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering::SeqCst;

static TERMINATE: AtomicBool = AtomicBool::new(false);

extern "C" fn handle_sigint(sig: i32) {
    log::warn!("sigint caught, tearing the group down");
    assert_eq!(sig, signal::SIGINT as i32);
    TERMINATE.store(true, SeqCst);
}

fn main() {
    logging::init_log();

    let opt = Opt::from_args();
    log::info!("options: {:?}", opt);

    let sig_action = signal::SigAction::new(
        signal::SigHandler::Handler(handle_sigint),
        signal::SaFlags::empty(),
        signal::SigSet::empty(),
    );
    unsafe {
        signal::sigaction(signal::SIGINT, &sig_action).expect("failed to register sighandler");
    }

    submit(opt).unwrap();
}
