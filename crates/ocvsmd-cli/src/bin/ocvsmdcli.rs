//! The `ocvsmdcli` client binary: a thin command-line front end over the
//! SDK-side service adapters, one subcommand per standardized service.

use std::time::Duration;

use clap::{Parser, Subcommand};

use ocvsmd_router::ClientRouter;
use ocvsmd_sdk::{execute_command, file_server, monitor, registers, run_blocking, Outcome};

#[derive(Parser, Debug)]
#[command(name = "ocvsmdcli")]
#[command(about = "Cyphal node-management daemon client")]
struct Args {
    /// Textual endpoint the daemon is listening on.
    #[arg(long, default_value = "unix:/run/ocvsmd.sock")]
    endpoint: String,

    /// Per-request timeout, in milliseconds.
    #[arg(long, default_value_t = 1000)]
    timeout_ms: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Issue `uavcan.node.ExecuteCommand` to one or more nodes.
    ExecuteCommand {
        #[arg(long, value_delimiter = ',')]
        node_ids: Vec<u16>,
        #[arg(long)]
        command: u16,
    },
    /// List register names on one or more nodes.
    RegisterList {
        #[arg(long, value_delimiter = ',')]
        node_ids: Vec<u16>,
    },
    /// List configured file-server roots.
    ListRoots,
    /// Append a file-server root.
    PushRoot { path: String },
    /// Remove the most recently added file-server root.
    PopRoot,
    /// Print the daemon's current network monitor snapshot.
    Snapshot,
}

fn main() {
    let args = Args::parse();

    let endpoint = match ocvsmd_address::parse(&args.endpoint, 0) {
        Ok(endpoint) => endpoint,
        Err(e) => {
            eprintln!("invalid endpoint {:?}: {e}", args.endpoint);
            std::process::exit(1);
        }
    };
    let timeout = Duration::from_millis(args.timeout_ms);

    let exit_code = run_blocking(async move {
        let client_router = match ClientRouter::connect(&endpoint).await {
            Ok(router) => router,
            Err(e) => {
                eprintln!("failed to connect to {:?}: {e}", args.endpoint);
                return 1;
            }
        };
        let handle = client_router.handle();
        tokio::task::spawn_local(client_router.run());

        match args.command {
            Command::ExecuteCommand { node_ids, command } => {
                let outcome =
                    execute_command::execute_command(&handle, node_ids, timeout, command, Vec::new())
                        .wait()
                        .await;
                match outcome {
                    Outcome::Success(responses) => {
                        for (node_id, response) in responses {
                            println!("{node_id}: status={} output={:?}", response.status, response.output);
                        }
                        0
                    }
                    Outcome::Failure(code) => {
                        eprintln!("execute-command failed: {code}");
                        1
                    }
                }
            }
            Command::RegisterList { node_ids } => {
                let outcome = registers::register_list(&handle, node_ids, timeout).wait().await;
                match outcome {
                    Outcome::Success(names_by_node) => {
                        for (node_id, names) in names_by_node {
                            println!("{node_id}: {}", names.join(", "));
                        }
                        0
                    }
                    Outcome::Failure(code) => {
                        eprintln!("register.list failed: {code}");
                        1
                    }
                }
            }
            Command::ListRoots => match file_server::list_roots(&handle).wait().await {
                Outcome::Success(roots) => {
                    for root in roots {
                        println!("{root}");
                    }
                    0
                }
                Outcome::Failure(code) => {
                    eprintln!("list_roots failed: {code}");
                    1
                }
            },
            Command::PushRoot { path } => match file_server::push_root(&handle, path).wait().await {
                Outcome::Success(()) => 0,
                Outcome::Failure(code) => {
                    eprintln!("push_root failed: {code}");
                    1
                }
            },
            Command::PopRoot => match file_server::pop_root(&handle).wait().await {
                Outcome::Success(()) => 0,
                Outcome::Failure(code) => {
                    eprintln!("pop_root failed: {code}");
                    1
                }
            },
            Command::Snapshot => match monitor::snapshot(&handle).wait().await {
                Outcome::Success(nodes) => {
                    for node in nodes {
                        println!("node_id={} health={} mode={}", node.node_id, node.health, node.mode);
                    }
                    0
                }
                Outcome::Failure(code) => {
                    eprintln!("snapshot failed: {code}");
                    1
                }
            },
        }
    });

    std::process::exit(exit_code);
}
