//! Coachline Server
//!
//! TCP server for a bus transport agency: employees log in, browse trips,
//! inspect seat maps, and reserve seats for walk-in clients. Reservations
//! are pushed to every other live session over the same connection.

mod auth;
mod dispatch;
mod error;
mod logging;
mod server;
mod service;
mod session;
mod state;
mod store;

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tracing::info;

use crate::service::Service;
use crate::store::Store;

#[derive(Parser)]
#[command(name = "coachline-server", version, about)]
struct Cli {
    /// SQLite database path.
    #[arg(long, env = "COACHLINE_DB", default_value = "coachline.db", global = true)]
    db: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the server (default).
    Serve {
        /// Address to listen on.
        #[arg(long, env = "COACHLINE_BIND", default_value = "127.0.0.1:55555")]
        bind: SocketAddr,

        /// Maximum number of concurrent connections.
        #[arg(long, env = "COACHLINE_MAX_CONNECTIONS", default_value_t = 1024)]
        max_connections: usize,
    },

    /// Create an employee account.
    AddEmployee {
        #[arg(long)]
        username: String,
        #[arg(long)]
        password: String,
        #[arg(long)]
        office_id: Option<i64>,
    },

    /// Create a trip.
    AddTrip {
        #[arg(long)]
        destination: String,
        /// Departure date, yyyy-MM-dd.
        #[arg(long)]
        date: String,
        /// Departure time, HH:mm.
        #[arg(long)]
        time: String,
        #[arg(long, default_value_t = 18)]
        seats: i64,
    },

    /// Print all trips.
    ListTrips,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let _logging = logging::init_logging()?;

    let store = Store::open(&cli.db)
        .with_context(|| format!("opening database {}", cli.db.display()))?;

    match cli.command.unwrap_or(Command::Serve {
        bind: "127.0.0.1:55555".parse().expect("valid default address"),
        max_connections: 1024,
    }) {
        Command::Serve {
            bind,
            max_connections,
        } => {
            let service = Service::new(store);
            let listener = TcpListener::bind(bind)
                .await
                .with_context(|| format!("binding {bind}"))?;
            server::run(listener, service, max_connections).await
        }

        Command::AddEmployee {
            username,
            password,
            office_id,
        } => {
            let id = store.insert_employee(&username, &auth::hash_password(&password), office_id)?;
            info!(
                component = "cli",
                event = "employee.added",
                id,
                username,
            );
            println!("added employee {username} (id {id})");
            Ok(())
        }

        Command::AddTrip {
            destination,
            date,
            time,
            seats,
        } => {
            let date = store::parse_date(&date)?;
            let time = store::parse_time(&time)?;
            let id = store.insert_trip(&destination, date, time, seats)?;
            println!("added trip {destination} (id {id})");
            Ok(())
        }

        Command::ListTrips => {
            for trip in store.all_trips()? {
                println!(
                    "{:>4}  {:<20} {} {}  {} seats left",
                    trip.id,
                    trip.destination,
                    store::format_date(trip.date),
                    store::format_time(trip.time),
                    trip.available_seats
                );
            }
            Ok(())
        }
    }
}
