//! Demo seeder for Dealerflow.
//!
//! Drives one restock and one customer sale through the workflow engine
//! against the in-memory store, then prints the resulting state as JSON.
//!
//! Usage: cargo run --bin seeder

use std::sync::Arc;

use anyhow::Context;
use dealerflow_core::dealer_request::{RequestItem, SubmitRequest};
use dealerflow_core::order::{
    ContractMeta, ContractUpload, CreateOrder, DeliverOrder, OrderItemInput, PaymentMethod,
    Recipient,
};
use dealerflow_core::payment::{PaymentChannel, PaymentInput};
use dealerflow_core::stock::{ReceiveStock, StockOwner};
use dealerflow_core::{ActorContext, MemoryStore, WorkflowEngine, WorkflowPolicy};
use dealerflow_shared::AppConfig;
use dealerflow_shared::types::{
    ApiResponse, CustomerId, DealershipId, ManufacturerId, Money, OrderId, UserId, VehicleId,
};
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

struct Cast {
    dealership: DealershipId,
    manufacturer: ManufacturerId,
    salesperson: ActorContext,
    manager: ActorContext,
    maker: ActorContext,
    vehicle: VehicleId,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = AppConfig::load().context("Failed to load configuration")?;
    init_tracing(&config);

    let engine = WorkflowEngine::new(Arc::new(MemoryStore::new()), WorkflowPolicy::from(&config));
    let dealership = DealershipId::new();
    let manufacturer = ManufacturerId::new();
    let cast = Cast {
        dealership,
        manufacturer,
        salesperson: ActorContext::dealer_staff(UserId::new(), dealership),
        manager: ActorContext::dealer_manager(UserId::new(), dealership),
        maker: ActorContext::manufacturer_staff(UserId::new(), manufacturer),
        vehicle: VehicleId::new(),
    };

    info!("Seeding manufacturer stock...");
    seed_manufacturer_stock(&engine, &cast).await?;

    info!("Seeding dealer restock...");
    seed_restock(&engine, &cast).await?;

    info!("Seeding customer sale...");
    let order_id = seed_sale(&engine, &cast).await?;

    let order = engine.get_order(&cast.manager, order_id).await?;
    let stock = engine
        .stock_by_color(&cast.manager, cast.vehicle, None)
        .await?;
    let debts = engine.list_debts(&cast.manager, Some(cast.dealership)).await?;
    let summary = serde_json::json!({
        "order": order,
        "order_history": engine.order_history(&cast.manager, order_id).await?,
        "stock": stock,
        "debts": debts,
    });
    let envelope = ApiResponse::ok("Demo workflow seeded", summary);
    println!("{}", serde_json::to_string_pretty(&envelope)?);

    info!("Seeding complete!");
    Ok(())
}

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.filter));
    let registry = tracing_subscriber::registry().with(filter);
    if config.logging.json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn seed_manufacturer_stock(
    engine: &WorkflowEngine<MemoryStore>,
    cast: &Cast,
) -> anyhow::Result<()> {
    for (color, quantity) in [("Red", 4), ("White", 2)] {
        engine
            .receive_stock(
                &cast.maker,
                ReceiveStock {
                    vehicle_id: cast.vehicle,
                    color: color.to_string(),
                    owner: StockOwner::Manufacturer(cast.manufacturer),
                    quantity,
                },
            )
            .await?;
    }
    Ok(())
}

/// Three Red units requested, approved, shipped and received.
async fn seed_restock(engine: &WorkflowEngine<MemoryStore>, cast: &Cast) -> anyhow::Result<()> {
    let request = engine
        .submit_request(
            &cast.salesperson,
            SubmitRequest {
                manufacturer_id: cast.manufacturer,
                items: vec![RequestItem {
                    vehicle_id: cast.vehicle,
                    color: "Red".to_string(),
                    quantity: 3,
                    unit_price: Money::from_minor(420_000_000),
                }],
                notes: Some("Spring restock".to_string()),
                order_id: None,
            },
        )
        .await?;
    engine.approve_request(&cast.manager, request.id).await?;
    engine.start_request(&cast.maker, request.id).await?;
    engine.deliver_request(&cast.maker, request.id, None).await?;
    engine.complete_request(&cast.manager, request.id).await?;

    let debt = engine
        .find_debt(&cast.manager, cast.dealership, cast.manufacturer)
        .await?
        .context("restock opened no debt")?;
    engine
        .record_debt_payment(
            &cast.manager,
            debt.id,
            PaymentInput::new(Money::from_minor(500_000_000), PaymentChannel::BankTransfer)
                .with_idempotency_key("seed-debt-1"),
        )
        .await?;
    Ok(())
}

/// One Red car sold, paid in two instalments and handed over.
async fn seed_sale(engine: &WorkflowEngine<MemoryStore>, cast: &Cast) -> anyhow::Result<OrderId> {
    let order = engine
        .create_order(
            &cast.salesperson,
            CreateOrder {
                customer_id: CustomerId::new(),
                items: vec![OrderItemInput::new(
                    cast.vehicle,
                    "Red",
                    1,
                    Money::from_minor(500_000_000),
                )],
                payment_method: PaymentMethod::Installment,
                notes: None,
            },
        )
        .await?;
    engine
        .generate_contract(
            &cast.salesperson,
            order.id,
            ContractMeta {
                signing_location: Some("Showroom".to_string()),
                ..ContractMeta::default()
            },
        )
        .await?;
    engine
        .upload_signed_contract(
            &cast.salesperson,
            order.id,
            vec![ContractUpload {
                filename: "contract-signed.pdf".to_string(),
                content_type: "application/pdf".to_string(),
                size: 512_000,
                storage_ref: format!("contracts/{}/contract-signed.pdf", order.id),
            }],
        )
        .await?;

    let deposit = engine.suggested_deposit(&cast.salesperson, order.id).await?;
    let order = engine
        .record_deposit(
            &cast.salesperson,
            order.id,
            PaymentInput::new(deposit, PaymentChannel::Cash),
        )
        .await?
        .updated;
    engine
        .record_full_payment(
            &cast.salesperson,
            order.id,
            PaymentInput::new(order.outstanding(), PaymentChannel::BankTransfer),
        )
        .await?;
    engine
        .deliver_order(
            &cast.salesperson,
            order.id,
            DeliverOrder {
                recipient: Recipient {
                    name: "Pham Thi D".to_string(),
                    phone: "0987654321".to_string(),
                    relationship: None,
                },
                delivery_person: Some("Showroom driver".to_string()),
                notes: None,
                actual_date: None,
            },
        )
        .await?;
    Ok(order.id)
}
