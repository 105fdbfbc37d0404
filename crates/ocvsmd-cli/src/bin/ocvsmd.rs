//! The `ocvsmd` daemon binary: loads configuration, optionally
//! daemonizes, binds the service registry, and drives the router until
//! the process is asked to stop.

use std::path::PathBuf;
use std::rc::Rc;
use std::time::Duration;

use clap::Parser;
use tracing::{info, warn};

use ocvsmd_cli::{daemonize, Config};
use ocvsmd_daemon::{
    execute_command, file_server, monitor, pnp, registers, ExecuteCommandService, RegisterAccessService,
    RegisterListService,
};
use ocvsmd_presentation::{MakeClientError, MockClient, MockPresentation, Presentation};
use ocvsmd_router::{ServerRouter, ServiceRegistry};

#[derive(Parser, Debug)]
#[command(name = "ocvsmd")]
#[command(about = "Cyphal node-management daemon")]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(long, default_value = "/etc/ocvsmd/ocvsmd.toml")]
    config: PathBuf,

    /// Stay attached to the controlling terminal instead of daemonizing.
    #[arg(long)]
    foreground: bool,

    /// PID file written after daemonizing. Ignored in `--foreground` mode.
    #[arg(long, default_value = "/var/run/ocvsmd.pid")]
    pid_file: PathBuf,
}

/// Stands in for the real Cyphal presentation layer (out of scope here —
/// see `ocvsmd-presentation`'s module docs) so the binary has something
/// concrete to register services against. One `MockPresentation<S>` per
/// service type, bundled behind a single `Presentation<S>` impl per `S`
/// so the daemon's registration code can take one shared handle, exactly
/// as it would with a real multi-service presentation backend.
struct PresentationBundle {
    execute_command: Rc<MockPresentation<ExecuteCommandService>>,
    register_list: Rc<MockPresentation<RegisterListService>>,
    register_access: Rc<MockPresentation<RegisterAccessService>>,
}

impl Presentation<ExecuteCommandService> for PresentationBundle {
    type Client = MockClient<ExecuteCommandService>;
    fn make_client(&self, node_id: u16) -> Result<Self::Client, MakeClientError> {
        self.execute_command.make_client(node_id)
    }
}

impl Presentation<RegisterListService> for PresentationBundle {
    type Client = MockClient<RegisterListService>;
    fn make_client(&self, node_id: u16) -> Result<Self::Client, MakeClientError> {
        self.register_list.make_client(node_id)
    }
}

impl Presentation<RegisterAccessService> for PresentationBundle {
    type Client = MockClient<RegisterAccessService>;
    fn make_client(&self, node_id: u16) -> Result<Self::Client, MakeClientError> {
        self.register_access.make_client(node_id)
    }
}

fn main() {
    let args = Args::parse();

    let config = match Config::load(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("failed to load {}: {e}", args.config.display());
            std::process::exit(1);
        }
    };

    ocvsmd_cli::logging::init(&config.log_level);

    if !args.foreground {
        // Safety: this is the first thing `main` does, before any other
        // thread (including the tokio runtime below) is spawned.
        if let Err(e) = unsafe { daemonize(&args.pid_file) } {
            eprintln!("failed to daemonize: {e}");
            std::process::exit(1);
        }
    }

    let endpoint = match ocvsmd_address::parse(&config.bind, 0) {
        Ok(endpoint) => endpoint,
        Err(e) => {
            eprintln!("invalid bind address {:?}: {e}", config.bind);
            std::process::exit(1);
        }
    };

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("failed to build the daemon's tokio runtime");
    let local = tokio::task::LocalSet::new();

    local.block_on(&runtime, async move {
        let presentation = Rc::new(PresentationBundle {
            execute_command: Rc::new(MockPresentation::new()),
            register_list: Rc::new(MockPresentation::new()),
            register_access: Rc::new(MockPresentation::new()),
        });

        let roots = file_server::new_roots(config.file_server_roots.clone());
        let known_nodes = monitor::new_known_nodes();
        let allocator = pnp::new_allocator();

        let mut registry = ServiceRegistry::new();
        registry
            .register(execute_command::SERVICE_NAME, execute_command::factory(presentation.clone()))
            .expect("service ids are fixed at compile time and never collide");
        registry
            .register(registers::LIST_SERVICE_NAME, registers::list_factory(presentation.clone()))
            .expect("service ids are fixed at compile time and never collide");
        registry
            .register(registers::ACCESS_SERVICE_NAME, registers::access_factory(presentation.clone()))
            .expect("service ids are fixed at compile time and never collide");
        registry
            .register(file_server::LIST_ROOTS_SERVICE_NAME, file_server::list_roots_factory(roots.clone()))
            .expect("service ids are fixed at compile time and never collide");
        registry
            .register(file_server::PUSH_ROOT_SERVICE_NAME, file_server::push_root_factory(roots.clone()))
            .expect("service ids are fixed at compile time and never collide");
        registry
            .register(file_server::POP_ROOT_SERVICE_NAME, file_server::pop_root_factory(roots))
            .expect("service ids are fixed at compile time and never collide");
        registry
            .register(monitor::SNAPSHOT_SERVICE_NAME, monitor::snapshot_factory(known_nodes))
            .expect("service ids are fixed at compile time and never collide");
        registry
            .register(pnp::ALLOCATE_SERVICE_NAME, pnp::allocate_factory(allocator))
            .expect("service ids are fixed at compile time and never collide");

        let router = match ServerRouter::bind(&endpoint, registry).await {
            Ok(router) => router,
            Err(e) => {
                eprintln!("failed to bind {:?}: {e}", config.bind);
                std::process::exit(1);
            }
        };

        info!(bind = %config.bind, "ocvsmd daemon started");

        let shutdown = router.shutdown_signal();
        let mut run_handle = tokio::task::spawn_local(router.run());

        tokio::select! {
            result = &mut run_handle => {
                let _ = result;
            }
            _ = tokio::signal::ctrl_c() => {
                info!("received shutdown signal, draining in-flight channels");
                shutdown.request();
                match tokio::time::timeout(Duration::from_secs(5), &mut run_handle).await {
                    Ok(_) => info!("drained cleanly"),
                    Err(_) => {
                        warn!("drain timed out after 5s, aborting remaining channels");
                        run_handle.abort();
                    }
                }
            }
        }

        info!("ocvsmd daemon terminated");
    });
}
