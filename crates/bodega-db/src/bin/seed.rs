//! # Seed Data Generator
//!
//! Populates the database with demo data for development.
//!
//! ## Usage
//! ```bash
//! # Seed with defaults
//! cargo run -p bodega-db --bin seed
//!
//! # Custom amount of products / database path
//! cargo run -p bodega-db --bin seed -- --products 50 --db ./data/bodega.db
//! ```
//!
//! ## Generated Data
//! - A small family-group tree (clothing departments)
//! - Per-branch variants with composed barcodes across 3 branches
//! - One pending purchase per provider with a debit posted to its ledger

use chrono::Utc;
use std::env;

use bodega_core::{barcode, FamilyGroup, Purchase, PurchaseLine, PurchaseStatus, VariantKey};
use bodega_db::{Database, DbConfig};

/// Family groups seeded as a small forest.
const GROUPS: &[(i64, &str, Option<i64>)] = &[
    (1, "Ropa", None),
    (2, "Camisas", Some(1)),
    (3, "Pantalones", Some(1)),
    (4, "Calzado", None),
    (5, "Deportivo", Some(4)),
];

/// Branches holding stock.
const BRANCHES: &[i64] = &[1, 2, 3];

/// Size and color catalogs referenced by variants.
const SIZES: &[i64] = &[1, 2, 3, 4];
const COLORS: &[i64] = &[10, 20, 30];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse command line arguments
    let args: Vec<String> = env::args().collect();

    let mut products: i64 = 20;
    let mut db_path = String::from("./bodega_dev.db");

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--products" | "-p" => {
                if i + 1 < args.len() {
                    products = args[i + 1].parse().unwrap_or(20);
                    i += 1;
                }
            }
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Bodega Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -p, --products <N>  Number of products to seed (default: 20)");
                println!("  -d, --db <PATH>     Database file path (default: ./bodega_dev.db)");
                println!("  -h, --help          Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    println!("🌱 Bodega Seed Data Generator");
    println!("=============================");
    println!("Database: {}", db_path);
    println!("Products: {}", products);
    println!();

    let db = Database::new(DbConfig::new(&db_path)).await?;

    println!("✓ Connected to database");
    println!("✓ Migrations applied");

    let existing = db.variants().count().await?;
    if existing > 0 {
        println!("⚠ Database already has {} variants", existing);
        println!("  Skipping seed to avoid duplicates.");
        println!("  Delete the database file to regenerate.");
        return Ok(());
    }

    println!();
    println!("Seeding family groups...");
    for &(id, name, parent) in GROUPS {
        db.groups()
            .insert(&FamilyGroup {
                id,
                name: name.to_string(),
                parent_group_id: parent,
                marked_as_root: parent.is_none(),
            })
            .await?;
    }
    println!("  {} groups", GROUPS.len());

    println!("Seeding variants...");
    let start = std::time::Instant::now();
    let mut seeded = 0u64;

    for product_id in 1..=products {
        for (n, &branch_id) in BRANCHES.iter().enumerate() {
            let size_id = SIZES[(product_id as usize + n) % SIZES.len()];
            let color_id = COLORS[(product_id as usize * 7 + n) % COLORS.len()];
            let key = VariantKey {
                product_id,
                size_id,
                color_id,
                branch_id,
            };

            let quantity = (product_id * 13 + branch_id * 5) % 40;
            let code = barcode::compose(product_id, size_id, color_id, seeded + 1);
            db.variants().create(&key, quantity, &code).await?;
            seeded += 1;
        }
    }
    println!("  {} variants in {:?}", seeded, start.elapsed());

    println!("Seeding purchases and ledgers...");
    let now = Utc::now();
    for provider_id in 1..=3i64 {
        let purchase_id = format!("seed-purchase-{}", provider_id);
        let quantity = 10 * provider_id;
        let cost_cents = 2_500;
        let subtotal = cost_cents * quantity;

        let purchase = Purchase {
            id: purchase_id.clone(),
            provider_id,
            subtotal_cents: subtotal,
            discount_cents: 0,
            total_cents: subtotal,
            status: PurchaseStatus::PendingDelivery,
            invoice_ref: Some(format!("INV-{:04}", provider_id)),
            delivery_date: None,
            created_at: now,
            updated_at: now,
        };
        let line = PurchaseLine {
            id: format!("seed-line-{}", provider_id),
            purchase_id: purchase_id.clone(),
            product_id: provider_id,
            size_id: SIZES[0],
            color_id: COLORS[0],
            cost_cents,
            quantity,
            discount_cents: 0,
            subtotal_cents: subtotal,
        };

        db.purchases().create(&purchase, &[line]).await?;
        db.ledger()
            .append(provider_id, subtotal, 0, Some(&purchase_id), None)
            .await?;
    }
    println!("  3 pending purchases with ledger debits");

    let report = serde_json::json!({
        "groups": GROUPS.len(),
        "variants": seeded,
        "pending_purchases": 3,
        "sample_summary": db.variants().summarize_by_product(1, None).await?,
    });

    println!();
    println!("✓ Seed complete!");
    println!("{}", serde_json::to_string_pretty(&report)?);

    Ok(())
}
