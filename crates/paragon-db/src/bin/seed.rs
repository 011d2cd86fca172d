//! # Seed Household Directory
//!
//! Prepares a development database: applies migrations, creates household
//! members and the sentinel "Other" member.
//!
//! ## Usage
//! ```bash
//! # Two default members
//! cargo run -p paragon-db --bin seed
//!
//! # Named members
//! cargo run -p paragon-db --bin seed -- --member Ania --member Tomek
//!
//! # Specify database path
//! cargo run -p paragon-db --bin seed -- --db ./data/paragon.db
//! ```

use paragon_db::{Database, DbConfig, DbError};
use std::env;

const DEFAULT_MEMBERS: &[&str] = &["Member 1", "Member 2"];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();

    let mut db_path = String::from("./paragon_dev.db");
    let mut members: Vec<String> = Vec::new();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "--member" | "-m" => {
                if i + 1 < args.len() {
                    members.push(args[i + 1].clone());
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Paragon Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -d, --db <PATH>       Database file path (default: ./paragon_dev.db)");
                println!("  -m, --member <NAME>   Household member to create (repeatable)");
                println!("  -h, --help            Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    if members.is_empty() {
        members = DEFAULT_MEMBERS.iter().map(|m| m.to_string()).collect();
    }

    println!("Paragon Seed Data Generator");
    println!("===========================");
    println!("Database: {}", db_path);
    println!();

    let db = Database::new(DbConfig::new(&db_path)).await?;
    println!("✓ Connected to database");
    println!("✓ Migrations applied");

    for name in &members {
        match db.users().add_user(name).await {
            Ok(user) => println!("✓ Added member {} (id {})", user.name, user.user_id),
            Err(DbError::UniqueViolation { .. }) => println!("⚠ Member {} already exists", name),
            Err(e) => return Err(e.into()),
        }
    }

    let other = db.users().ensure_other_user().await?;
    println!("✓ Sentinel member {} (id {})", other.name, other.user_id);

    println!();
    println!("Household:");
    for user in db.users().list_users().await? {
        println!("  {:>4}  {}", user.user_id, user.name);
    }

    db.close().await;
    Ok(())
}
