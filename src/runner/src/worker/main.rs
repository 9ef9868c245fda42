use fanin::driver::Participant;
use fanin::{report, topology, Value, ROOT};
use meshmsg::wire;
use runner::fabric::MeshFabric;
use runner::message;

fn main() -> anyhow::Result<()> {
    logging::init_log();

    let controller_uri =
        std::env::var(runner::CONTROLLER_URI_ENV).expect(runner::CONTROLLER_URI_ENV);
    log::info!("joining the group at {}", controller_uri);

    let (nodes, my_node, mut controller, listener) = meshmsg::join_group(&controller_uri)?;
    let rank = meshmsg::rank_of(&my_node, &nodes);
    let group = nodes.len();
    log::info!("assigned rank {} of {}", rank, group);

    let peers = meshmsg::connect_mesh(&nodes, &my_node, &listener)?;
    let mut fabric = MeshFabric::new(peers);

    // contributions default to the rank itself, which makes the run
    // self-verifying against the closed-form total
    let override_value = std::env::var(runner::CONTRIBUTION_ENV).ok();
    let contribution = match &override_value {
        Some(raw) => raw
            .parse::<Value>()
            .map_err(|e| anyhow::anyhow!("bad {}: {}", runner::CONTRIBUTION_ENV, e))?,
        None => rank as Value,
    };

    if rank == ROOT {
        log::info!("group size: {}", group);
        log::info!("tree height: {}", topology::tree_height(group));
    }

    let mut participant = Participant::new(rank, group, contribution)?;
    if let Some(total) = participant.run(&mut fabric)? {
        let expected = match override_value {
            // the closed form only describes the default contributions
            Some(_) => None,
            None => Some(report::rank_sum(group)),
        };
        report::publish(rank, total, expected);
        wire::send_cmd(
            &mut controller,
            &message::Command::Total {
                value: total,
                expected,
            },
        )?;
    }

    log::info!("rank {} leaving the group", rank);
    wire::send_cmd(&mut controller, &message::Command::Leave(my_node))?;

    // hold the mesh open until the whole group is done, so nobody tears
    // down a stream a straggler still needs
    match wire::recv_cmd(&mut controller)? {
        message::Command::Shutdown => {}
        cmd => anyhow::bail!("unexpected command while waiting for shutdown: {:?}", cmd),
    }
    log::info!("rank {} done", rank);

    Ok(())
}
