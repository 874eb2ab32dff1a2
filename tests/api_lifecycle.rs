use actix_web::http::StatusCode;
use actix_web::{test, web, App};
use chrono::{TimeZone, Utc};
use serde_json::{json, Value};
use std::sync::Arc;
use uuid::Uuid;

use order_fulfillment::api::{self, AppState, GATEWAY_SECRET_HEADER, USER_ID_HEADER, USER_ROLE_HEADER};
use order_fulfillment::clock::FixedClock;
use order_fulfillment::domain::checkout::{CheckoutService, InMemoryCartStore};
use order_fulfillment::domain::inventory::{InMemoryInventory, InventoryStore, ProductRecord, ProductStatus};
use order_fulfillment::domain::order::{
    CarrierRegistry, Money, OrderSweeper, PricingPolicy, ShippingPolicy, SweepRules, TransitionEngine,
};
use order_fulfillment::messaging::{GuardedPaymentClient, SimulatedGateway};
use order_fulfillment::metrics::Metrics;
use order_fulfillment::store::InMemoryOrderStore;

// ============================================================================
// Fixture
// ============================================================================

const GATEWAY_SECRET: &str = "whsec_test";

struct Fixture {
    state: web::Data<AppState>,
    inventory: Arc<InMemoryInventory>,
    product_id: Uuid,
    customer: Uuid,
}

impl Fixture {
    async fn new() -> Self {
        let clock = Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2024, 6, 3, 9, 0, 0).unwrap()));
        let metrics = Arc::new(Metrics::new().unwrap());
        let store = Arc::new(InMemoryOrderStore::new());
        let inventory = Arc::new(InMemoryInventory::new());

        let product_id = Uuid::new_v4();
        inventory
            .upsert_product(ProductRecord {
                id: product_id,
                name: "Soapstone chess set".to_string(),
                sku: "SSC-01".to_string(),
                price: Money::from_units(2000),
                stock: 10,
                status: ProductStatus::Active,
                seller_id: None,
                variants: vec![],
            })
            .await;

        let engine = Arc::new(TransitionEngine::new(
            store,
            inventory.clone(),
            Arc::new(CarrierRegistry::default()),
            ShippingPolicy::default(),
            clock.clone(),
            metrics.clone(),
        ));
        let payments = Arc::new(GuardedPaymentClient::new(
            Arc::new(SimulatedGateway::new()),
            std::time::Duration::from_secs(5),
            metrics.clone(),
        ));
        let checkout = Arc::new(CheckoutService::new(
            engine.clone(),
            inventory.clone(),
            Arc::new(InMemoryCartStore::new()),
            payments,
            PricingPolicy::default(),
            metrics.clone(),
        ));
        let sweeper = Arc::new(OrderSweeper::new(engine.clone(), SweepRules::default(), metrics));

        Self {
            state: web::Data::new(AppState {
                engine,
                checkout,
                sweeper,
                clock,
                gateway_secret: Some(GATEWAY_SECRET.to_string()),
            }),
            inventory,
            product_id,
            customer: Uuid::new_v4(),
        }
    }

    fn checkout_body(&self, payment_method: &str, quantity: u32) -> Value {
        json!({
            "items": [{ "productId": self.product_id, "quantity": quantity }],
            "shippingAddress": {
                "fullName": "Achieng Odhiambo",
                "phone": "+254700123456",
                "street": "Tom Mboya Street 21",
                "city": "Nairobi",
                "region": "Nairobi",
                "country": "KE"
            },
            "paymentMethod": payment_method
        })
    }

    async fn stock(&self) -> u32 {
        self.inventory.get_product(self.product_id).await.unwrap().unwrap().stock
    }
}

fn as_role(req: test::TestRequest, user_id: Uuid, role: &str) -> test::TestRequest {
    req.insert_header((USER_ID_HEADER, user_id.to_string()))
        .insert_header((USER_ROLE_HEADER, role))
}

macro_rules! app {
    ($fixture:expr) => {
        test::init_service(
            App::new()
                .app_data($fixture.state.clone())
                .configure(api::configure),
        )
        .await
    };
}

// ============================================================================
// Tests
// ============================================================================

#[actix_web::test]
async fn test_cash_on_delivery_order_runs_to_delivery() {
    let fx = Fixture::new().await;
    let app = app!(fx);
    let staff = Uuid::new_v4();
    let admin = Uuid::new_v4();

    // Checkout
    let req = as_role(test::TestRequest::post().uri("/checkout"), fx.customer, "customer")
        .set_json(fx.checkout_body("cash_on_delivery", 2))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let body: Value = test::read_body_json(resp).await;
    let order_id = body["order"]["id"].as_str().unwrap().to_string();
    assert_eq!(body["order"]["status"], "confirmed");
    assert_eq!(body["order"]["pricing"]["totalAmount"], 494_000);
    assert_eq!(body["payment"]["state"], "not_required");
    assert_eq!(fx.stock().await, 8);

    // Staff moves it along
    for (status, extra) in [
        ("processing", json!({ "carrier": "DHL" })),
        ("shipped", json!({})),
    ] {
        let mut payload = json!({ "status": status, "note": format!("moved to {}", status) });
        payload.as_object_mut().unwrap().extend(extra.as_object().unwrap().clone());
        let req = as_role(
            test::TestRequest::patch().uri(&format!("/orders/{}/status", order_id)),
            staff,
            "staff",
        )
        .set_json(payload)
        .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK, "transition to {}", status);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["disposition"], "applied");
    }

    // Public tracking lookup
    let req = as_role(
        test::TestRequest::get().uri(&format!("/orders/{}", order_id)),
        fx.customer,
        "customer",
    )
    .to_request();
    let order: Value = test::call_and_read_body_json(&app, req).await;
    let tracking_number = order["trackingInfo"]["trackingNumber"].as_str().unwrap().to_string();
    assert_eq!(order["trackingInfo"]["carrier"], "DHL");

    let req = test::TestRequest::get()
        .uri(&format!("/tracking/{}", tracking_number))
        .to_request();
    let view: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(view["status"], "shipped");
    assert_eq!(view["events"].as_array().unwrap().len(), 4);

    // Delivered
    let req = as_role(
        test::TestRequest::patch().uri(&format!("/orders/{}/status", order_id)),
        staff,
        "staff",
    )
    .set_json(json!({ "status": "delivered", "deliveredAt": "2024-06-06T12:00:00Z" }))
    .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);

    // Owner timeline carries the full history
    let req = as_role(
        test::TestRequest::get().uri(&format!("/orders/{}/tracking", order_id)),
        fx.customer,
        "customer",
    )
    .to_request();
    let timeline: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(timeline["history"].as_array().unwrap().len(), 4);
    assert_eq!(timeline["trackingNumber"], tracking_number.as_str());

    // Delivery metrics
    let req = as_role(
        test::TestRequest::get().uri("/metrics/delivery?start=2024-06-01&end=2024-06-30"),
        admin,
        "admin",
    )
    .to_request();
    let metrics: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(metrics["delivered"], 1);
    assert_eq!(metrics["onTimeRate"], 1.0);
}

#[actix_web::test]
async fn test_identity_and_role_checks() {
    let fx = Fixture::new().await;
    let app = app!(fx);

    // No identity at all
    let req = test::TestRequest::post()
        .uri("/checkout")
        .set_json(fx.checkout_body("cash_on_delivery", 1))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "unauthenticated");

    let req = as_role(test::TestRequest::post().uri("/checkout"), fx.customer, "customer")
        .set_json(fx.checkout_body("cash_on_delivery", 1))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    let order_id = body["order"]["id"].as_str().unwrap().to_string();

    // A customer cannot move orders
    let req = as_role(
        test::TestRequest::patch().uri(&format!("/orders/{}/status", order_id)),
        fx.customer,
        "customer",
    )
    .set_json(json!({ "status": "processing" }))
    .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::FORBIDDEN);

    // Nor read someone else's order
    let req = as_role(
        test::TestRequest::get().uri(&format!("/orders/{}", order_id)),
        Uuid::new_v4(),
        "customer",
    )
    .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::FORBIDDEN);

    // Staff is not admin
    let req = as_role(test::TestRequest::post().uri("/automated-updates"), Uuid::new_v4(), "staff").to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::FORBIDDEN);
}

#[actix_web::test]
async fn test_error_taxonomy_over_http() {
    let fx = Fixture::new().await;
    let app = app!(fx);
    let staff = Uuid::new_v4();

    // Unknown order
    let req = as_role(
        test::TestRequest::patch().uri(&format!("/orders/{}/status", Uuid::new_v4())),
        staff,
        "staff",
    )
    .set_json(json!({ "status": "processing" }))
    .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    // Unknown tracking number
    let req = test::TestRequest::get().uri("/tracking/G4S000000ABCDEF").to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);

    // Empty cart
    let mut empty = fx.checkout_body("cash_on_delivery", 1);
    empty["items"] = json!([]);
    let req = as_role(test::TestRequest::post().uri("/checkout"), fx.customer, "customer")
        .set_json(empty)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "validation_error");

    // Malformed body
    let req = as_role(test::TestRequest::post().uri("/checkout"), fx.customer, "customer")
        .set_json(json!({ "paymentMethod": "barter" }))
        .to_request();
    assert_eq!(
        test::call_service(&app, req).await.status(),
        StatusCode::UNPROCESSABLE_ENTITY
    );

    // Illegal edge: confirmed -> delivered
    let req = as_role(test::TestRequest::post().uri("/checkout"), fx.customer, "customer")
        .set_json(fx.checkout_body("cash_on_delivery", 1))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    let order_id = body["order"]["id"].as_str().unwrap().to_string();

    let req = as_role(
        test::TestRequest::patch().uri(&format!("/orders/{}/status", order_id)),
        staff,
        "staff",
    )
    .set_json(json!({ "status": "delivered" }))
    .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CONFLICT);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "invalid_transition");
}

#[actix_web::test]
async fn test_mobile_money_callback_is_idempotent() {
    let fx = Fixture::new().await;
    let app = app!(fx);

    let req = as_role(test::TestRequest::post().uri("/checkout"), fx.customer, "customer")
        .set_json(fx.checkout_body("mobile_money", 1))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["order"]["status"], "pending");
    assert_eq!(body["payment"]["state"], "awaiting_callback");
    let reference = body["payment"]["reference"].as_str().unwrap().to_string();
    let order_id = body["order"]["id"].as_str().unwrap().to_string();

    let callback = json!({
        "reference": reference,
        "success": true,
        "transactionId": "QHX81K2M9P"
    });

    let req = test::TestRequest::post()
        .uri("/payments/callback")
        .set_json(callback.clone())
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "unauthenticated");

    let req = test::TestRequest::post()
        .uri("/payments/callback")
        .insert_header((GATEWAY_SECRET_HEADER, "whsec_guess"))
        .set_json(callback.clone())
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::UNAUTHORIZED);

    let req = as_role(
        test::TestRequest::get().uri(&format!("/orders/{}", order_id)),
        fx.customer,
        "customer",
    )
    .to_request();
    let unpaid: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(unpaid["status"], "pending");
    assert_eq!(unpaid["payment"]["status"], "pending");

    let req = test::TestRequest::post()
        .uri("/payments/callback")
        .insert_header((GATEWAY_SECRET_HEADER, GATEWAY_SECRET))
        .set_json(callback.clone())
        .to_request();
    let first: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(first["applied"], true);
    assert_eq!(first["order"]["status"], "confirmed");
    assert_eq!(first["order"]["payment"]["status"], "completed");

    let req = test::TestRequest::post()
        .uri("/payments/callback")
        .insert_header((GATEWAY_SECRET_HEADER, GATEWAY_SECRET))
        .set_json(callback)
        .to_request();
    let second: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(second["applied"], false);
    assert_eq!(second["order"]["statusHistory"], first["order"]["statusHistory"]);
}

#[actix_web::test]
async fn test_bulk_cancel_restores_stock_and_reports_per_order() {
    let fx = Fixture::new().await;
    let app = app!(fx);

    let mut order_ids = Vec::new();
    for quantity in [3, 2] {
        let req = as_role(test::TestRequest::post().uri("/checkout"), fx.customer, "customer")
            .set_json(fx.checkout_body("cash_on_delivery", quantity))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        order_ids.push(body["order"]["id"].as_str().unwrap().to_string());
    }
    assert_eq!(fx.stock().await, 5);

    let missing = Uuid::new_v4().to_string();
    let req = as_role(test::TestRequest::patch().uri("/orders/bulk-status"), Uuid::new_v4(), "admin")
        .set_json(json!({
            "orderIds": [order_ids[0], order_ids[1], missing],
            "status": "cancelled",
            "note": "warehouse flooded"
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["succeeded"], 2);
    assert_eq!(body["failed"], 1);

    assert_eq!(fx.stock().await, 10);
}
