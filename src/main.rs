//! addecat - ADDE server catalog CLI

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use addecat::{
    migrate_legacy, read_legacy_servers, remove_legacy, same_identity, servers_with_type,
    CoalescedServer, Config, FileResources, LayerOutcome, Paths, ServerDescriptor, ServerRegistry,
};

#[derive(Parser)]
#[command(name = "addecat")]
#[command(about = "ADDE server catalog - list, edit, and merge server/group descriptors")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug output
    #[arg(short, long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List known data types
    Types {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// List servers for a data type (active only by default)
    List {
        /// Data type (image, point, grid, text, nav, ...)
        data_type: String,

        /// Include inactive servers
        #[arg(long)]
        all: bool,

        /// Show each server name once
        #[arg(long)]
        unique: bool,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// List groups of the active servers for a data type
    Groups {
        data_type: String,
    },

    /// Add a server/group to the user servers file
    Add {
        data_type: String,
        server: String,
        group: String,

        /// Add as inactive
        #[arg(long)]
        inactive: bool,
    },

    /// Remove a server/group from the user servers file
    Remove {
        data_type: String,
        server: String,
        group: String,
    },

    /// Mark a server/group active
    Enable {
        data_type: String,
        server: String,
        group: String,
    },

    /// Mark a server/group inactive
    Disable {
        data_type: String,
        server: String,
        group: String,
    },

    /// Remove every server from the user servers file (types are kept)
    Clear,

    /// Get or set the default account
    Account {
        #[command(subcommand)]
        action: AccountAction,
    },

    /// Show the merged catalog across all layers
    Catalog {
        /// Only this data type
        #[arg(long = "type")]
        data_type: Option<String>,

        /// Only active servers
        #[arg(long)]
        active: bool,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Move entries from the legacy server list into the user servers file
    Migrate,

    /// Show resolved paths and layer status (for debugging)
    Paths,
}

#[derive(Subcommand)]
enum AccountAction {
    /// Show user and project
    Get,

    /// Set user and project
    Set {
        user: String,
        proj: String,
    },
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.debug);

    let paths = Paths::resolve();
    let config = match Config::load(paths.config_path()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };
    let store = FileResources::from_paths(&paths, &config);
    let mut registry = ServerRegistry::open(store, config.merge);

    match cli.command {
        Commands::Types { json } => {
            let types = registry.server_types().to_vec();
            if json {
                print_json(&types);
            } else if types.is_empty() {
                println!("No server types defined.");
            } else {
                for t in types {
                    println!("{t}");
                }
            }
        }
        Commands::List {
            data_type,
            all,
            unique,
            json,
        } => {
            let selection = registry.servers(&data_type, all, !unique);
            if json {
                print_json(&selection.descriptors);
            } else if selection.descriptors.is_empty() {
                println!("No {} servers.", data_type);
            } else {
                print_server_table(&selection.descriptors);
            }
        }
        Commands::Groups { data_type } => {
            for g in registry.groups(&data_type) {
                println!("{g}");
            }
        }
        Commands::Add {
            data_type,
            server,
            group,
            inactive,
        } => {
            let sd = ServerDescriptor::with_active(&data_type, &server, &group, !inactive);
            exit_on_error(registry.add_servers(&data_type, &[sd]));
            println!("Added {}/{} ({})", server, group, data_type);
        }
        Commands::Remove {
            data_type,
            server,
            group,
        } => match registry.remove_server(&data_type, &server, &group) {
            Ok(true) => println!("Removed {}/{} ({})", server, group, data_type),
            Ok(false) => {
                eprintln!("Not in user servers file: {}/{} ({})", server, group, data_type);
                std::process::exit(1);
            }
            Err(e) => {
                eprintln!("Error: {}", e);
                std::process::exit(1);
            }
        },
        Commands::Enable {
            data_type,
            server,
            group,
        } => set_active(&mut registry, &data_type, &server, &group, true),
        Commands::Disable {
            data_type,
            server,
            group,
        } => set_active(&mut registry, &data_type, &server, &group, false),
        Commands::Clear => {
            exit_on_error(registry.clear());
            println!("Cleared user servers");
        }
        Commands::Account { action } => match action {
            AccountAction::Get => {
                println!("User: {}", registry.user());
                println!("Proj: {}", registry.proj());
            }
            AccountAction::Set { user, proj } => {
                exit_on_error(registry.set_credentials(&user, &proj));
                println!("Set account {} / {}", user, proj);
            }
        },
        Commands::Catalog {
            data_type,
            active,
            json,
        } => {
            let merged = registry.coalesced();
            let view: Vec<&CoalescedServer> =
                servers_with_type(&merged, data_type.as_deref(), active);
            if json {
                print_json(&view);
            } else if view.is_empty() {
                println!("Catalog is empty.");
            } else {
                print_catalog_table(&view);
            }
        }
        Commands::Migrate => {
            let legacy = match read_legacy_servers(paths.legacy_servers_path()) {
                Ok(l) => l,
                Err(e) => {
                    eprintln!("Error: {}", e);
                    std::process::exit(1);
                }
            };
            if legacy.is_empty() {
                println!("No legacy servers to migrate.");
                return;
            }

            let migration = migrate_legacy(&legacy, registry.coalesced(), &config.legacy_type);
            for r in &migration.rejected {
                eprintln!("Skipping unparseable legacy entry: {}", r);
            }
            let new: Vec<ServerDescriptor> = migration
                .migrated
                .iter()
                .filter(|m| !registry.descriptors().iter().any(|d| same_identity(d, m)))
                .cloned()
                .collect();
            exit_on_error(registry.add_servers(&config.legacy_type, &new));

            if migration.delete_legacy {
                exit_on_error(remove_legacy(paths.legacy_servers_path()));
            }
            println!("Migrated {} legacy servers", new.len());
        }
        Commands::Paths => {
            println!("User servers:   {}", paths.user_servers_path().display());
            println!("System servers: {}", paths.system_servers_path().display());
            println!("Config:         {}", paths.config_path().display());
            println!("Legacy list:    {}", paths.legacy_servers_path().display());
            println!();
            for layer in &registry.report().layers {
                let status = match layer.outcome {
                    LayerOutcome::Loaded { ref descriptors, .. } => {
                        format!("{} servers", descriptors.len())
                    }
                    LayerOutcome::Skipped { ref reason } => format!("skipped ({})", reason),
                };
                let rw = if layer.writable { "rw" } else { "ro" };
                println!("[{}] {}: {}", rw, layer.name, status);
            }
        }
    }
}

fn init_logging(debug: bool) {
    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn exit_on_error<T, E: std::fmt::Display>(result: Result<T, E>) -> T {
    match result {
        Ok(v) => v,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) {
    println!("{}", exit_on_error(serde_json::to_string_pretty(value)));
}

fn set_active(
    registry: &mut ServerRegistry<FileResources>,
    data_type: &str,
    server: &str,
    group: &str,
    active: bool,
) {
    match registry.set_active(data_type, server, group, active) {
        Ok(true) => {
            let state = if active { "active" } else { "inactive" };
            println!("{}/{} ({}) is now {}", server, group, data_type, state);
        }
        Ok(false) => {
            eprintln!("Server not found: {}/{} ({})", server, group, data_type);
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}

fn print_server_table(servers: &[ServerDescriptor]) {
    const INDENT: &str = "        ";

    for s in servers {
        println!("{}", s.server_name());
        println!("{}Group:   {}", INDENT, s.group_name());
        println!("{}Type:    {}", INDENT, s.data_type());
        println!("{}Active:  {}", INDENT, if s.is_active() { "yes" } else { "no" });
        println!();
    }
}

fn print_catalog_table(servers: &[&CoalescedServer]) {
    const INDENT: &str = "        ";

    for c in servers {
        let s = &c.descriptor;
        println!("{}", s);
        println!("{}Type:    {}", INDENT, s.data_type());
        println!("{}Active:  {}", INDENT, if s.is_active() { "yes" } else { "no" });
        println!("{}Source:  {}", INDENT, if c.local { "local" } else { "shared" });
        println!();
    }
}
