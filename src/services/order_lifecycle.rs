use std::sync::Arc;
use std::time::Instant;

use chrono::{Duration, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::domain::cart::CartSnapshot;
use crate::domain::identity::{Principal, Role};
use crate::domain::inventory::{release_all, reserve_all, InventoryError, StockLine};
use crate::domain::order::*;
use crate::error::AppError;
use crate::metrics::Metrics;
use crate::payments::{PaymentGateway, PaymentSetup};
use crate::store::{OrderHistory, OrderQuery, OrderScope};
use super::{execute_releasing, Backends};

// ============================================================================
// Order Lifecycle Service
// ============================================================================
//
// Create-order flow:
// 1. Validate the cart and every product against the catalog (no effects)
// 2. Reserve every line, all or nothing
// 3. Deferred methods: create the provider intent / checkout session
// 4. Persist the order; cash on delivery also empties the cart
//
// Any failure after step 2 releases the reserved lines before returning.
// Status changes and cancellations return their units to the ledger before
// the order is written, and take them back if the write fails.
//
// ============================================================================

pub const MAX_PAGE_SIZE: u32 = 100;

#[derive(Debug, Clone)]
pub struct CreateOrder {
    pub cart_id: Uuid,
    pub shipping_address: ShippingAddress,
    pub payment_method: PaymentMethod,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlacedOrder {
    pub order: OrderSummary,
    pub order_details: Order,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment: Option<PaymentSetup>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub current_page: u32,
    pub total_pages: u64,
    pub total_orders: u64,
    pub has_next: bool,
    pub has_prev: bool,
    pub limit: u32,
}

impl Pagination {
    pub fn new(page: u32, limit: u32, total_orders: u64) -> Self {
        let total_pages = total_orders.div_ceil(u64::from(limit.max(1)));
        Self {
            current_page: page,
            total_pages,
            total_orders,
            has_next: u64::from(page) < total_pages,
            has_prev: page > 1,
            limit,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderListing {
    pub orders: Vec<OrderView>,
    pub pagination: Pagination,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_role: Option<Role>,
}

pub struct OrderLifecycleService {
    backends: Backends,
    handler: OrderCommandHandler,
    gateway: Arc<dyn PaymentGateway>,
    metrics: Arc<Metrics>,
    /// How long a deferred-payment order keeps its stock
    hold: Duration,
}

impl OrderLifecycleService {
    pub fn new(
        backends: Backends,
        gateway: Arc<dyn PaymentGateway>,
        metrics: Arc<Metrics>,
        hold: Duration,
    ) -> Self {
        Self {
            handler: OrderCommandHandler::new(backends.orders.clone()),
            backends,
            gateway,
            metrics,
            hold,
        }
    }

    // ========================================================================
    // Create
    // ========================================================================

    pub async fn create_order(&self, principal: &Principal, request: CreateOrder) -> Result<PlacedOrder, AppError> {
        let started = Instant::now();

        let problems = request.shipping_address.problems();
        if !problems.is_empty() {
            return Err(AppError::invalid_fields(problems));
        }

        let cart = self
            .backends
            .carts
            .get_cart(request.cart_id)
            .await?
            .filter(|cart| cart.user_id == principal.user_id)
            .ok_or_else(|| AppError::NotFound("Cart not found or doesn't belong to you".to_string()))?;

        if cart.is_empty() {
            return Err(AppError::InvalidOrder("Cart is empty".to_string()));
        }

        let items = self.snapshot_items(&cart).await?;
        let lines: Vec<StockLine> = items.iter().map(OrderItem::stock_line).collect();

        if let Err(err) = reserve_all(self.backends.ledger.as_ref(), &lines).await {
            let reason = match err {
                InventoryError::InsufficientStock { .. } => "insufficient_stock",
                InventoryError::ProductNotFound(_) => "product_not_found",
                _ => "backend",
            };
            self.metrics.record_reservation_failure(reason);
            return Err(err.into());
        }

        let placed = match self.place_reserved(principal, &cart, items, &request).await {
            Ok(placed) => placed,
            Err(err) => {
                self.compensate(&lines).await;
                return Err(err);
            }
        };

        self.metrics.record_order_created(request.payment_method.as_str());
        self.metrics.observe_operation("create_order", started.elapsed().as_secs_f64());

        tracing::info!(
            order_id = %placed.order_details.id,
            user_id = %principal.user_id,
            payment_method = request.payment_method.as_str(),
            total = %placed.order_details.total_price,
            "Order created"
        );
        Ok(placed)
    }

    /// Snapshot each cart line against the catalog. Nothing is reserved yet.
    async fn snapshot_items(&self, cart: &CartSnapshot) -> Result<Vec<OrderItem>, AppError> {
        let mut items = Vec::with_capacity(cart.items.len());

        for line in &cart.items {
            let product = self
                .backends
                .catalog
                .find_product(line.product_id)
                .await?
                .ok_or_else(|| AppError::InvalidOrder(format!("Product {} not found", line.product_id)))?;

            let seller_id = product.seller_id.ok_or_else(|| {
                AppError::InvalidOrder(format!("Product {} has no seller assigned", product.title))
            })?;

            if product.stock < u64::from(line.quantity) {
                return Err(AppError::InvalidOrder(format!(
                    "Insufficient stock for product: {}. Available: {}, Requested: {}",
                    product.title, product.stock, line.quantity
                )));
            }

            items.push(OrderItem {
                product_id: product.id,
                seller_id,
                quantity: line.quantity,
                unit_price: line.price_at_add,
                title: product.title,
                thumbnail: product.thumbnail,
            });
        }

        Ok(items)
    }

    async fn place_reserved(
        &self,
        principal: &Principal,
        cart: &CartSnapshot,
        items: Vec<OrderItem>,
        request: &CreateOrder,
    ) -> Result<PlacedOrder, AppError> {
        let order_id = Uuid::now_v7();
        let hold_expires_at = Utc::now() + self.hold;
        let command = |payment_reference: Option<String>| OrderCommand::PlaceOrder {
            order_id,
            user_id: principal.user_id,
            cart_id: cart.id,
            items: items.clone(),
            shipping_address: request.shipping_address.clone(),
            payment_method: request.payment_method,
            payment_reference,
            hold_expires_at,
        };

        let payment = if request.payment_method.is_deferred() {
            let (draft, _) = Order::place(&command(None))?;
            Some(self.setup_payment(&draft).await?)
        } else {
            None
        };

        let reference = payment.as_ref().map(|setup| setup.reference().to_string());
        let order = self
            .handler
            .place(&command(reference), Uuid::new_v4(), Some(principal.user_id))
            .await?;

        if !request.payment_method.is_deferred() {
            // The order stands even if the cart cannot be emptied
            if let Err(err) = self.backends.carts.clear_cart(cart.id).await {
                tracing::warn!(cart_id = %cart.id, error = %err, "Failed to clear cart after order");
            }
        }

        Ok(PlacedOrder {
            order: OrderSummary::from(&order),
            order_details: order,
            payment,
        })
    }

    async fn setup_payment(&self, order: &Order) -> Result<PaymentSetup, AppError> {
        let setup = if order.payment_method.is_card() {
            PaymentSetup::Intent(self.gateway.create_intent(order).await?)
        } else {
            PaymentSetup::Checkout(self.gateway.create_checkout_session(order).await?)
        };
        Ok(setup)
    }

    async fn compensate(&self, lines: &[StockLine]) {
        match release_all(self.backends.ledger.as_ref(), lines).await {
            Ok(()) => {
                self.metrics.record_compensation("create_order", true);
                let units = lines.iter().map(|line| u64::from(line.quantity)).sum();
                self.metrics.record_units_released("compensation", units);
                tracing::warn!(lines = lines.len(), "Order creation failed, reserved stock released");
            }
            Err(err) => {
                self.metrics.record_compensation("create_order", false);
                tracing::error!(error = %err, "Order creation failed and reserved stock could not be released");
            }
        }
    }

    // ========================================================================
    // Status changes
    // ========================================================================

    pub async fn change_status(
        &self,
        principal: &Principal,
        order_id: Uuid,
        target: OrderStatus,
    ) -> Result<OrderView, AppError> {
        let order = self.load(order_id).await?;
        let executed = self
            .run(order, &OrderCommand::ChangeStatus { target, principal: *principal }, principal)
            .await?;
        Ok(OrderView::for_principal(&executed.order, principal))
    }

    pub async fn cancel(&self, principal: &Principal, order_id: Uuid) -> Result<OrderView, AppError> {
        let order = self.load(order_id).await?;
        let executed = self
            .run(order, &OrderCommand::Cancel { principal: *principal }, principal)
            .await?;
        Ok(OrderView::for_principal(&executed.order, principal))
    }

    async fn run(&self, order: Order, command: &OrderCommand, principal: &Principal) -> Result<Executed, AppError> {
        let from = order.status;
        let executed = execute_releasing(
            &self.handler,
            self.backends.ledger.as_ref(),
            &self.metrics,
            order,
            command,
            Some(principal.user_id),
        )
        .await?;

        for event in &executed.events {
            match event {
                OrderEvent::StatusChanged(e) => {
                    self.metrics.record_transition(e.from.as_str(), e.to.as_str(), principal.role.as_str());
                }
                OrderEvent::Cancelled(e) => {
                    self.metrics.record_transition(from.as_str(), e.resulting_status.as_str(), principal.role.as_str());
                    self.metrics.record_cancellation(
                        e.resulting_status == OrderStatus::PartiallyCancelled,
                        principal.role.as_str(),
                    );
                }
                _ => {}
            }
        }

        tracing::info!(
            order_id = %executed.order.id,
            from = %from,
            to = %executed.order.status,
            role = %principal.role,
            "Order status changed"
        );
        Ok(executed)
    }

    // ========================================================================
    // Reads
    // ========================================================================

    async fn load(&self, order_id: Uuid) -> Result<Order, AppError> {
        self.backends
            .orders
            .get(order_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Order not found".to_string()))
    }

    /// Orders the principal may not see are reported as missing
    async fn load_visible(&self, principal: &Principal, order_id: Uuid) -> Result<Order, AppError> {
        let order = self.load(order_id).await?;
        if !order.is_visible_to(principal) {
            return Err(AppError::NotFound("Order not found".to_string()));
        }
        Ok(order)
    }

    pub async fn get_order(&self, principal: &Principal, order_id: Uuid) -> Result<OrderView, AppError> {
        let order = self.load_visible(principal, order_id).await?;
        Ok(OrderView::for_principal(&order, principal))
    }

    pub async fn payment_status(&self, principal: &Principal, order_id: Uuid) -> Result<PaymentStatusView, AppError> {
        let order = self.load_visible(principal, order_id).await?;
        Ok(PaymentStatusView::from(&order))
    }

    /// Every stored event of an order, oldest first. Admin only.
    pub async fn history(&self, principal: &Principal, order_id: Uuid) -> Result<OrderHistory, AppError> {
        if principal.role != Role::Admin {
            return Err(AppError::Forbidden("Only admins can read order history".to_string()));
        }
        let order = self.load(order_id).await?;
        Ok(self.backends.orders.history(order.id).await?)
    }

    /// Sellers see orders containing their items, everyone else their own
    pub async fn my_orders(
        &self,
        principal: &Principal,
        page: u32,
        limit: u32,
        status: Option<OrderStatus>,
    ) -> Result<OrderListing, AppError> {
        let scope = match principal.role {
            Role::Seller => OrderScope::SoldBy(principal.user_id),
            Role::Admin | Role::User => OrderScope::PlacedBy(principal.user_id),
        };
        let mut listing = self.list(principal, scope, page, limit, status).await?;
        listing.user_role = Some(principal.role);
        Ok(listing)
    }

    pub async fn all_orders(
        &self,
        principal: &Principal,
        page: u32,
        limit: u32,
        status: Option<OrderStatus>,
    ) -> Result<OrderListing, AppError> {
        if principal.role != Role::Admin {
            return Err(AppError::Forbidden("Only admins can list all orders".to_string()));
        }
        self.list(principal, OrderScope::All, page, limit, status).await
    }

    async fn list(
        &self,
        principal: &Principal,
        scope: OrderScope,
        page: u32,
        limit: u32,
        status: Option<OrderStatus>,
    ) -> Result<OrderListing, AppError> {
        if page < 1 {
            return Err(AppError::validation("Page must be at least 1"));
        }
        if !(1..=MAX_PAGE_SIZE).contains(&limit) {
            return Err(AppError::validation(format!("Limit must be between 1 and {MAX_PAGE_SIZE}")));
        }

        let query = OrderQuery { scope, status, page, limit };
        let page_of_orders = self.backends.orders.list(&query).await?;

        Ok(OrderListing {
            orders: page_of_orders
                .orders
                .iter()
                .map(|order| OrderView::for_principal(order, principal))
                .collect(),
            pagination: Pagination::new(page, limit, page_of_orders.total),
            user_role: None,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::domain::inventory::{InventoryLedger, Product, ProductCatalog};
    use crate::domain::money::Money;
    use crate::domain::order::aggregate::tests::address;
    use crate::payments::SandboxGateway;
    use crate::store::{CartStore, InMemoryStore, OrderRepository};

    pub(crate) struct Fixture {
        pub store: Arc<InMemoryStore>,
        pub gateway: Arc<SandboxGateway>,
        pub metrics: Arc<Metrics>,
        pub service: OrderLifecycleService,
    }

    pub(crate) fn fixture() -> Fixture {
        let store = Arc::new(InMemoryStore::new());
        let gateway = Arc::new(SandboxGateway::new("https://pay.example.test/checkout"));
        let metrics = Arc::new(Metrics::new().unwrap());
        let service = OrderLifecycleService::new(
            Backends::from_store(store.clone()),
            gateway.clone(),
            metrics.clone(),
            Duration::minutes(30),
        );
        Fixture { store, gateway, metrics, service }
    }

    /// A saved cart for `user` holding `quantity` of each product
    pub(crate) async fn cart_with(store: &InMemoryStore, user: Uuid, lines: &[(Uuid, u32)]) -> CartSnapshot {
        let mut cart = CartSnapshot::new(user);
        for (product_id, quantity) in lines {
            let product = store.find_product(*product_id).await.unwrap().unwrap();
            cart.add_item(*product_id, *quantity, product.price, product.stock).unwrap();
        }
        store.save_cart(&cart).await.unwrap();
        cart
    }

    pub(crate) fn request(cart_id: Uuid, payment_method: PaymentMethod) -> CreateOrder {
        CreateOrder {
            cart_id,
            shipping_address: address(),
            payment_method,
        }
    }

    #[tokio::test]
    async fn test_gateway_order_reserves_and_stays_pending() {
        let f = fixture();
        let user = Uuid::new_v4();
        let product = f.store.seed_product("Kettle", 3000, 5, Some(Uuid::new_v4())).await;
        let cart = cart_with(&f.store, user, &[(product, 2)]).await;

        let placed = f
            .service
            .create_order(&Principal::user(user), request(cart.id, PaymentMethod::OnlineGateway))
            .await
            .unwrap();

        assert_eq!(f.store.stock_of(product).await.unwrap(), 3);
        assert_eq!(placed.order_details.status, OrderStatus::Pending);
        assert_eq!(placed.order_details.payment_status, PaymentStatus::Pending);
        assert!(matches!(placed.order_details.stock_hold, StockHold::Held { .. }));
        assert!(matches!(placed.payment, Some(PaymentSetup::Checkout(_))));
        assert_eq!(placed.order_details.payment_reference.as_deref(), placed.payment.as_ref().map(|p| p.reference()));

        // Cart stays until the payment settles
        assert!(!f.store.get_cart(cart.id).await.unwrap().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cash_order_is_paid_and_clears_cart() {
        let f = fixture();
        let user = Uuid::new_v4();
        let product = f.store.seed_product("Kettle", 3000, 5, Some(Uuid::new_v4())).await;
        let cart = cart_with(&f.store, user, &[(product, 2)]).await;

        let placed = f
            .service
            .create_order(&Principal::user(user), request(cart.id, PaymentMethod::CashOnDelivery))
            .await
            .unwrap();

        assert_eq!(f.store.stock_of(product).await.unwrap(), 3);
        assert_eq!(placed.order_details.payment_status, PaymentStatus::Paid);
        assert_eq!(placed.order_details.stock_hold, StockHold::Committed);
        assert!(placed.payment.is_none());
        assert!(f.store.get_cart(cart.id).await.unwrap().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_card_order_gets_payment_intent() {
        let f = fixture();
        let user = Uuid::new_v4();
        let product = f.store.seed_product("Kettle", 3000, 5, Some(Uuid::new_v4())).await;
        let cart = cart_with(&f.store, user, &[(product, 1)]).await;

        let placed = f
            .service
            .create_order(&Principal::user(user), request(cart.id, PaymentMethod::CreditCard))
            .await
            .unwrap();

        let Some(PaymentSetup::Intent(intent)) = placed.payment else {
            panic!("expected a payment intent");
        };
        assert!(intent.reference.starts_with("pi_"));
    }

    #[tokio::test]
    async fn test_foreign_cart_is_not_found() {
        let f = fixture();
        let product = f.store.seed_product("Kettle", 3000, 5, Some(Uuid::new_v4())).await;
        let cart = cart_with(&f.store, Uuid::new_v4(), &[(product, 1)]).await;

        let result = f
            .service
            .create_order(&Principal::user(Uuid::new_v4()), request(cart.id, PaymentMethod::CashOnDelivery))
            .await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_product_without_seller_is_invalid_and_reserves_nothing() {
        let f = fixture();
        let user = Uuid::new_v4();
        let sold = f.store.seed_product("Kettle", 3000, 5, Some(Uuid::new_v4())).await;
        let orphan = f.store.seed_product("Orphan", 100, 5, None).await;
        let cart = cart_with(&f.store, user, &[(sold, 1), (orphan, 1)]).await;

        let result = f
            .service
            .create_order(&Principal::user(user), request(cart.id, PaymentMethod::CashOnDelivery))
            .await;

        assert!(matches!(result, Err(AppError::InvalidOrder(msg)) if msg.contains("no seller")));
        assert_eq!(f.store.stock_of(sold).await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_payment_setup_failure_releases_stock() {
        let f = fixture();
        let user = Uuid::new_v4();
        let product = f.store.seed_product("Kettle", 3000, 5, Some(Uuid::new_v4())).await;
        let cart = cart_with(&f.store, user, &[(product, 2)]).await;
        f.gateway.fail_next_calls(1);

        let result = f
            .service
            .create_order(&Principal::user(user), request(cart.id, PaymentMethod::DebitCard))
            .await;

        assert!(matches!(result, Err(AppError::PaymentSetupFailed(_))));
        assert_eq!(f.store.stock_of(product).await.unwrap(), 5);
        assert_eq!(f.store.list(&OrderQuery { scope: OrderScope::All, status: None, page: 1, limit: 10 }).await.unwrap().total, 0);
    }

    #[tokio::test]
    async fn test_invalid_address_lists_fields() {
        let f = fixture();
        let mut req = request(Uuid::new_v4(), PaymentMethod::CashOnDelivery);
        req.shipping_address.city = String::new();

        let result = f.service.create_order(&Principal::user(Uuid::new_v4()), req).await;
        assert!(matches!(result, Err(AppError::Validation { errors, .. }) if errors.len() == 1));
    }

    #[tokio::test]
    async fn test_cancel_pending_releases_once() {
        let f = fixture();
        let user = Uuid::new_v4();
        let principal = Principal::user(user);
        let product = f.store.seed_product("Kettle", 3000, 5, Some(Uuid::new_v4())).await;
        let cart = cart_with(&f.store, user, &[(product, 2)]).await;
        let placed = f
            .service
            .create_order(&principal, request(cart.id, PaymentMethod::CreditCard))
            .await
            .unwrap();
        let order_id = placed.order_details.id;

        f.service.cancel(&principal, order_id).await.unwrap();
        assert_eq!(f.store.stock_of(product).await.unwrap(), 5);

        let again = f.service.cancel(&principal, order_id).await;
        assert!(matches!(again, Err(AppError::InvalidTransition(_))));
        assert_eq!(f.store.stock_of(product).await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_seller_partial_cancellation() {
        let f = fixture();
        let user = Uuid::new_v4();
        let (seller_a, seller_b) = (Uuid::new_v4(), Uuid::new_v4());
        let a = f.store.seed_product("A", 1000, 10, Some(seller_a)).await;
        let b = f.store.seed_product("B", 2000, 10, Some(seller_b)).await;
        let cart = cart_with(&f.store, user, &[(a, 3), (b, 1)]).await;
        let placed = f
            .service
            .create_order(&Principal::user(user), request(cart.id, PaymentMethod::CashOnDelivery))
            .await
            .unwrap();
        let order_id = placed.order_details.id;

        f.service.cancel(&Principal::seller(seller_a), order_id).await.unwrap();

        assert_eq!(f.store.stock_of(a).await.unwrap(), 10);
        assert_eq!(f.store.stock_of(b).await.unwrap(), 9);
        let order = f.store.get(order_id).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::PartiallyCancelled);
        assert_eq!(order.total_price, Money::cents(5000));

        // Sellers cancel only from pending or confirmed
        let late = f.service.cancel(&Principal::seller(seller_b), order_id).await;
        assert!(matches!(late, Err(AppError::InvalidTransition(_))));
        assert_eq!(f.store.stock_of(b).await.unwrap(), 9);

        f.service
            .change_status(&Principal::admin(Uuid::new_v4()), order_id, OrderStatus::Cancelled)
            .await
            .unwrap();
        assert_eq!(f.store.stock_of(a).await.unwrap(), 10);
        assert_eq!(f.store.stock_of(b).await.unwrap(), 10);
        assert_eq!(f.store.get(order_id).await.unwrap().unwrap().status, OrderStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_status_cancel_by_admin_releases_stock() {
        let f = fixture();
        let user = Uuid::new_v4();
        let product = f.store.seed_product("Kettle", 3000, 5, Some(Uuid::new_v4())).await;
        let cart = cart_with(&f.store, user, &[(product, 4)]).await;
        let placed = f
            .service
            .create_order(&Principal::user(user), request(cart.id, PaymentMethod::CashOnDelivery))
            .await
            .unwrap();
        let admin = Principal::admin(Uuid::new_v4());

        f.service
            .change_status(&admin, placed.order_details.id, OrderStatus::Confirmed)
            .await
            .unwrap();
        f.service
            .change_status(&admin, placed.order_details.id, OrderStatus::Cancelled)
            .await
            .unwrap();

        assert_eq!(f.store.stock_of(product).await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_admin_status_cancel_from_shipped_releases_stock() {
        let f = fixture();
        let user = Uuid::new_v4();
        let product = f.store.seed_product("Kettle", 3000, 5, Some(Uuid::new_v4())).await;
        let cart = cart_with(&f.store, user, &[(product, 2)]).await;
        let placed = f
            .service
            .create_order(&Principal::user(user), request(cart.id, PaymentMethod::CashOnDelivery))
            .await
            .unwrap();
        let order_id = placed.order_details.id;
        let admin = Principal::admin(Uuid::new_v4());

        for target in [OrderStatus::Confirmed, OrderStatus::Shipped] {
            f.service.change_status(&admin, order_id, target).await.unwrap();
        }
        // Cancel refuses shipped orders, a status change to cancelled does not
        let cancel = f.service.cancel(&admin, order_id).await;
        assert!(matches!(cancel, Err(AppError::InvalidTransition(_))));

        f.service.change_status(&admin, order_id, OrderStatus::Cancelled).await.unwrap();
        assert_eq!(f.store.stock_of(product).await.unwrap(), 5);
        assert_eq!(f.store.get(order_id).await.unwrap().unwrap().status, OrderStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_failed_release_leaves_order_cancellable() {
        let f = fixture();
        let user = Uuid::new_v4();
        let product = f.store.seed_product("Kettle", 3000, 5, Some(Uuid::new_v4())).await;
        let cart = cart_with(&f.store, user, &[(product, 2)]).await;
        let placed = f
            .service
            .create_order(&Principal::user(user), request(cart.id, PaymentMethod::CashOnDelivery))
            .await
            .unwrap();
        let order_id = placed.order_details.id;

        f.store.fail_next_releases(10);
        let first = f.service.cancel(&Principal::user(user), order_id).await;
        f.store.fail_next_releases(0);

        assert!(matches!(first, Err(AppError::Internal(_))));
        assert_eq!(f.store.get(order_id).await.unwrap().unwrap().status, OrderStatus::Pending);
        assert_eq!(f.store.stock_of(product).await.unwrap(), 3);

        f.service.cancel(&Principal::user(user), order_id).await.unwrap();
        assert_eq!(f.store.stock_of(product).await.unwrap(), 5);
        assert_eq!(f.store.get(order_id).await.unwrap().unwrap().status, OrderStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_history_lists_events_for_admin_only() {
        let f = fixture();
        let user = Uuid::new_v4();
        let product = f.store.seed_product("Kettle", 3000, 5, Some(Uuid::new_v4())).await;
        let cart = cart_with(&f.store, user, &[(product, 1)]).await;
        let placed = f
            .service
            .create_order(&Principal::user(user), request(cart.id, PaymentMethod::CashOnDelivery))
            .await
            .unwrap();
        let order_id = placed.order_details.id;
        let admin = Principal::admin(Uuid::new_v4());
        f.service.change_status(&admin, order_id, OrderStatus::Confirmed).await.unwrap();

        let history = f.service.history(&admin, order_id).await.unwrap();
        let types: Vec<&str> = history.iter().map(|e| e.event_type.as_str()).collect();
        assert_eq!(types, ["OrderPlaced", "OrderStatusChanged"]);
        assert_eq!(history[1].actor_id, Some(admin.user_id));

        let denied = f.service.history(&Principal::user(user), order_id).await;
        assert!(matches!(denied, Err(AppError::Forbidden(_))));
        let missing = f.service.history(&admin, Uuid::new_v4()).await;
        assert!(matches!(missing, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_other_users_order_is_not_found() {
        let f = fixture();
        let user = Uuid::new_v4();
        let product = f.store.seed_product("Kettle", 3000, 5, Some(Uuid::new_v4())).await;
        let cart = cart_with(&f.store, user, &[(product, 1)]).await;
        let placed = f
            .service
            .create_order(&Principal::user(user), request(cart.id, PaymentMethod::CashOnDelivery))
            .await
            .unwrap();

        let result = f.service.get_order(&Principal::user(Uuid::new_v4()), placed.order_details.id).await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
        assert!(f.service.get_order(&Principal::user(user), placed.order_details.id).await.is_ok());
    }

    #[tokio::test]
    async fn test_my_orders_pagination_and_seller_view() {
        let f = fixture();
        let user = Uuid::new_v4();
        let (seller_a, seller_b) = (Uuid::new_v4(), Uuid::new_v4());
        let a = f.store.seed_product("A", 1000, 50, Some(seller_a)).await;
        let b = f.store.seed_product("B", 2000, 50, Some(seller_b)).await;

        for _ in 0..3 {
            let cart = cart_with(&f.store, user, &[(a, 1), (b, 1)]).await;
            f.service
                .create_order(&Principal::user(user), request(cart.id, PaymentMethod::CashOnDelivery))
                .await
                .unwrap();
        }

        let listing = f.service.my_orders(&Principal::user(user), 1, 2, None).await.unwrap();
        assert_eq!(listing.orders.len(), 2);
        assert_eq!(
            listing.pagination,
            Pagination { current_page: 1, total_pages: 2, total_orders: 3, has_next: true, has_prev: false, limit: 2 }
        );

        let seller = f.service.my_orders(&Principal::seller(seller_a), 1, 10, None).await.unwrap();
        assert_eq!(seller.orders.len(), 3);
        let OrderView::Seller(view) = &seller.orders[0] else {
            panic!("sellers get the filtered view");
        };
        assert_eq!(view.order.items.len(), 1);
        assert!(view.is_partial_order);
    }

    #[tokio::test]
    async fn test_listing_bounds_are_validated() {
        let f = fixture();
        let principal = Principal::user(Uuid::new_v4());

        assert!(matches!(f.service.my_orders(&principal, 0, 10, None).await, Err(AppError::Validation { .. })));
        assert!(matches!(f.service.my_orders(&principal, 1, 101, None).await, Err(AppError::Validation { .. })));
        assert!(matches!(f.service.all_orders(&principal, 1, 10, None).await, Err(AppError::Forbidden(_))));
    }

    #[test]
    fn test_pagination_of_empty_listing() {
        let pagination = Pagination::new(1, 10, 0);
        assert_eq!(pagination.total_pages, 0);
        assert!(!pagination.has_next);
        assert!(!pagination.has_prev);
    }

    #[tokio::test]
    async fn test_catalog_price_change_does_not_reprice_order() {
        let f = fixture();
        let user = Uuid::new_v4();
        let product = f.store.seed_product("Kettle", 3000, 5, Some(Uuid::new_v4())).await;
        let cart = cart_with(&f.store, user, &[(product, 1)]).await;

        let mut repriced: Product = f.store.find_product(product).await.unwrap().unwrap();
        repriced.price = Money::cents(9999);
        f.store.upsert_product(&repriced).await.unwrap();

        let placed = f
            .service
            .create_order(&Principal::user(user), request(cart.id, PaymentMethod::CashOnDelivery))
            .await
            .unwrap();
        assert_eq!(placed.order_details.total_price, Money::cents(3000));
    }
}
