use fanin::Value;
use meshmsg::endpoint::{self, Endpoint};
use meshmsg::Node;
use runner::message;

fn main() -> anyhow::Result<()> {
    logging::init_log();

    let group_size: usize = std::env::var(runner::GROUP_SIZE_ENV)
        .expect(runner::GROUP_SIZE_ENV)
        .parse()
        .expect(runner::GROUP_SIZE_ENV);
    anyhow::ensure!(group_size >= 1, "a group needs at least one worker");

    let controller_uri =
        std::env::var(runner::CONTROLLER_URI_ENV).expect(runner::CONTROLLER_URI_ENV);
    log::info!(
        "assembling a group of {} at {}",
        group_size,
        controller_uri
    );

    let (_listener, members) = meshmsg::assemble_group(&controller_uri, group_size)?;

    // token order = rank order, same sort the workers saw
    let mut members: Vec<(Node, std::net::TcpStream)> = members.into_iter().collect();
    members.sort_by(|a, b| a.0.cmp(&b.0));

    log::debug!("switching member streams to nonblocking");
    let mut endpoints = Vec::with_capacity(members.len());
    for (node, stream) in members {
        stream.set_nonblocking(true)?;
        log::trace!("monitoring {}", node);
        endpoints.push(Endpoint::new(stream)?);
    }

    io_loop(endpoints)
}

fn io_loop(mut endpoints: Vec<Endpoint>) -> anyhow::Result<()> {
    let poll = mio::Poll::new()?;
    let mut events = mio::Events::with_capacity(1024);

    for (i, ep) in endpoints.iter().enumerate() {
        poll.register(
            ep.stream(),
            mio::Token(i),
            mio::Ready::readable(),
            mio::PollOpt::level(),
        )?;
    }

    let mut run = Run::new(endpoints.len());

    'outer: loop {
        poll.poll(&mut events, None)?;
        for event in events.iter() {
            let index = event.token().0;
            assert!(index < endpoints.len());

            let mut group_done = false;
            if event.readiness().is_readable() {
                match endpoints[index].on_recv_ready::<message::Command>() {
                    Ok(cmd) => group_done = run.handle_cmd(cmd)?,
                    Err(endpoint::Error::WouldBlock) => {}
                    Err(e) => {
                        // a worker cannot leave mid-protocol without
                        // stranding its partners, so give up on the run
                        return Err(anyhow::Error::from(e).context("lost a worker"));
                    }
                }
            }

            if group_done {
                log::debug!("every worker has left, broadcasting shutdown");
                for (i, ep) in endpoints.iter_mut().enumerate() {
                    ep.post(message::Command::Shutdown)?;
                    poll.reregister(
                        ep.stream(),
                        mio::Token(i),
                        mio::Ready::writable(),
                        mio::PollOpt::level(),
                    )?;
                }
                continue;
            }

            if event.readiness().is_writable() {
                match endpoints[index].on_send_ready() {
                    Ok(()) | Err(endpoint::Error::NothingToSend) => {
                        poll.deregister(endpoints[index].stream())?;
                        if run.mark_shutdown_flushed() {
                            break 'outer;
                        }
                    }
                    Err(endpoint::Error::WouldBlock) => {}
                    Err(e) => return Err(e.into()),
                }
            }
        }
    }

    match run.reported {
        Some(total) => log::info!("run complete, global sum = {}", total),
        None => log::warn!("run complete, but the root never reported a total"),
    }
    Ok(())
}

struct Run {
    num_remaining: usize,
    pending_shutdowns: usize,
    reported: Option<Value>,
}

impl Run {
    fn new(group_size: usize) -> Self {
        Run {
            num_remaining: group_size,
            pending_shutdowns: group_size,
            reported: None,
        }
    }

    /// Returns true once every worker has left and the shutdown broadcast
    /// should go out.
    fn handle_cmd(&mut self, cmd: message::Command) -> anyhow::Result<bool> {
        use message::Command::*;
        match cmd {
            Total { value, expected } => {
                match expected {
                    Some(expected) => {
                        log::info!("root reports global sum = {} (expected {})", value, expected)
                    }
                    None => log::info!("root reports global sum = {}", value),
                }
                self.reported = Some(value);
            }
            Leave(node) => {
                log::debug!("{} left", node);
                self.num_remaining -= 1;
            }
            cmd => anyhow::bail!("unexpected command from a worker: {:?}", cmd),
        }
        Ok(self.num_remaining == 0)
    }

    /// Returns true once the last shutdown has been flushed.
    fn mark_shutdown_flushed(&mut self) -> bool {
        self.pending_shutdowns -= 1;
        self.pending_shutdowns == 0
    }
}
