//! PostgreSQL-backed order store.
//!
//! ## Error Mapping
//!
//! SQLx errors are mapped to `StoreError` as follows:
//!
//! | SQLx Error | PostgreSQL SQLSTATE | StoreError | Scenario |
//! |------------|---------------------|------------|----------|
//! | Database | `40001` | `Aborted` | Serialization failure; retry the whole operation |
//! | Database | `40P01` | `Aborted` | This transaction was chosen as the deadlock victim |
//! | Database | `55P03` | `Aborted` | Lock not available (lock_timeout / NOWAIT) |
//! | Io / PoolTimedOut / PoolClosed | N/A | `Aborted` | Connection-level failure; transaction is gone |
//! | Database (other) | Any other | `Backend` | Constraint violations, malformed data, etc. |
//! | Other | N/A | `Backend` | Decoding failures and the rest |
//!
//! ## Locking
//!
//! `SELECT ... FOR UPDATE` on the `orders` row serializes concurrent
//! transitions of the same order; `SELECT ... FOR UPDATE` on `product` rows
//! guards the stock check-and-update step. The lock acquisition order
//! across product rows is chosen by the engine, not here.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{FromRow, PgPool, Postgres, Row, Transaction};
use tracing::instrument;

use bakehouse_catalog::Product;
use bakehouse_core::{CustomerId, EmployeeId, OrderId, ProductId};
use bakehouse_orders::{DeliveryDetails, Order, OrderLine, OrderStatus};

use super::r#trait::{OrderStore, OrderUnitOfWork, StoreError};

/// Postgres-backed `OrderStore`.
///
/// ## Thread Safety
///
/// Uses the SQLx connection pool, which is thread-safe (Arc + Send + Sync).
/// Each unit of work owns one pooled connection for its lifetime.
#[derive(Debug, Clone)]
pub struct PgOrderStore {
    pool: Arc<PgPool>,
}

impl PgOrderStore {
    /// Create a new PgOrderStore with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    async fn lines_for(&self, order_id: &OrderId) -> Result<Vec<OrderLine>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT line_no, prod_id, quantity, unit_price
            FROM orderline
            WHERE order_id = $1
            ORDER BY line_no ASC
            "#,
        )
        .bind(order_id.as_str())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("lines_for", e))?;

        let mut lines = Vec::with_capacity(rows.len());
        for row in rows {
            let line = LineRow::from_row(&row)
                .map_err(|e| StoreError::Backend(format!("malformed orderline row: {e}")))?;
            lines.push(line.try_into()?);
        }
        Ok(lines)
    }
}

/// Unit of work over one Postgres transaction.
struct PgUnitOfWork {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl OrderUnitOfWork for PgUnitOfWork {
    async fn status_for_update(
        &mut self,
        order_id: &OrderId,
    ) -> Result<Option<OrderStatus>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT status
            FROM orders
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(order_id.as_str())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("status_for_update", e))?;

        match row {
            Some(row) => {
                let status: String = row
                    .try_get("status")
                    .map_err(|e| StoreError::Backend(format!("malformed orders row: {e}")))?;
                let status = status.parse::<OrderStatus>().map_err(|e| {
                    StoreError::Backend(format!("unknown status in orders row: {e}"))
                })?;
                Ok(Some(status))
            }
            None => Ok(None),
        }
    }

    async fn lines(&mut self, order_id: &OrderId) -> Result<Vec<OrderLine>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT line_no, prod_id, quantity, unit_price
            FROM orderline
            WHERE order_id = $1
            ORDER BY line_no ASC
            "#,
        )
        .bind(order_id.as_str())
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("lines", e))?;

        let mut lines = Vec::with_capacity(rows.len());
        for row in rows {
            let line = LineRow::from_row(&row)
                .map_err(|e| StoreError::Backend(format!("malformed orderline row: {e}")))?;
            lines.push(line.try_into()?);
        }
        Ok(lines)
    }

    async fn stock_for_update(
        &mut self,
        product_id: &ProductId,
    ) -> Result<Option<i64>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT stock
            FROM product
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(product_id.as_str())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("stock_for_update", e))?;

        match row {
            Some(row) => {
                let stock: i64 = row
                    .try_get("stock")
                    .map_err(|e| StoreError::Backend(format!("malformed product row: {e}")))?;
                Ok(Some(stock))
            }
            None => Ok(None),
        }
    }

    async fn adjust_stock(
        &mut self,
        product_id: &ProductId,
        delta: i64,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE product
            SET stock = stock + $2
            WHERE id = $1
            "#,
        )
        .bind(product_id.as_str())
        .bind(delta)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("adjust_stock", e))?;

        if result.rows_affected() != 1 {
            return Err(StoreError::Backend(format!(
                "adjust_stock touched {} rows for product {product_id}",
                result.rows_affected()
            )));
        }
        Ok(())
    }

    async fn set_status(
        &mut self,
        order_id: &OrderId,
        status: OrderStatus,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE orders
            SET status = $2, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(order_id.as_str())
        .bind(status.as_str())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("set_status", e))?;

        if result.rows_affected() != 1 {
            return Err(StoreError::Backend(format!(
                "set_status touched {} rows for order {order_id}",
                result.rows_affected()
            )));
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx
            .commit()
            .await
            .map_err(|e| map_sqlx_error("commit", e))
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        self.tx
            .rollback()
            .await
            .map_err(|e| map_sqlx_error("rollback", e))
    }
}

#[async_trait]
impl OrderStore for PgOrderStore {
    async fn begin(&self) -> Result<Box<dyn OrderUnitOfWork>, StoreError> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin", e))?;
        Ok(Box::new(PgUnitOfWork { tx }))
    }

    #[instrument(skip(self, order), fields(order_id = %order.id), err)]
    async fn insert_order(&self, order: &Order) -> Result<(), StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin", e))?;

        sqlx::query(
            r#"
            INSERT INTO orders (
                id, customer_id, employee_id, status, total_amount,
                receiver, receive_phone, receive_address, note,
                receive_date, receive_slot, placed_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(order.id.as_str())
        .bind(order.customer.map(i32::from))
        .bind(order.employee.map(i32::from))
        .bind(order.status.as_str())
        .bind(order.total as i64)
        .bind(&order.delivery.receiver)
        .bind(&order.delivery.phone)
        .bind(&order.delivery.address)
        .bind(order.delivery.note.as_deref())
        .bind(order.delivery.date)
        .bind(&order.delivery.slot)
        .bind(order.placed_at)
        .bind(order.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("insert_order", e))?;

        for line in &order.lines {
            sqlx::query(
                r#"
                INSERT INTO orderline (order_id, line_no, prod_id, quantity, unit_price)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(order.id.as_str())
            .bind(line.line_no as i32)
            .bind(line.product_id.as_str())
            .bind(line.quantity)
            .bind(line.unit_price as i64)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("insert_orderline", e))?;
        }

        tx.commit().await.map_err(|e| map_sqlx_error("commit", e))
    }

    #[instrument(skip(self), fields(order_id = %order_id), err)]
    async fn order(&self, order_id: &OrderId) -> Result<Option<Order>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, customer_id, employee_id, status, total_amount,
                   receiver, receive_phone, receive_address, note,
                   receive_date, receive_slot, placed_at, updated_at
            FROM orders
            WHERE id = $1
            "#,
        )
        .bind(order_id.as_str())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("order", e))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let head = OrderRow::from_row(&row)
            .map_err(|e| StoreError::Backend(format!("malformed orders row: {e}")))?;
        let lines = self.lines_for(order_id).await?;
        Ok(Some(head.into_order(lines)?))
    }

    #[instrument(skip(self), fields(customer = %customer), err)]
    async fn orders_for_customer(
        &self,
        customer: CustomerId,
    ) -> Result<Vec<Order>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, customer_id, employee_id, status, total_amount,
                   receiver, receive_phone, receive_address, note,
                   receive_date, receive_slot, placed_at, updated_at
            FROM orders
            WHERE customer_id = $1
            ORDER BY placed_at DESC
            "#,
        )
        .bind(customer.get())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("orders_for_customer", e))?;

        let mut orders = Vec::with_capacity(rows.len());
        for row in rows {
            let head = OrderRow::from_row(&row)
                .map_err(|e| StoreError::Backend(format!("malformed orders row: {e}")))?;
            let order_id = OrderId::parse(&head.id)
                .map_err(|e| StoreError::Backend(format!("malformed order id: {e}")))?;
            let lines = self.lines_for(&order_id).await?;
            orders.push(head.into_order(lines)?);
        }
        Ok(orders)
    }

    #[instrument(skip(self, product), fields(product_id = %product.id), err)]
    async fn upsert_product(&self, product: &Product) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO product (id, name, price, stock)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (id)
            DO UPDATE SET
                name = EXCLUDED.name,
                price = EXCLUDED.price,
                stock = EXCLUDED.stock
            "#,
        )
        .bind(product.id.as_str())
        .bind(&product.name)
        .bind(product.price as i64)
        .bind(product.stock)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("upsert_product", e))?;
        Ok(())
    }

    #[instrument(skip(self), fields(product_id = %product_id), err)]
    async fn product(&self, product_id: &ProductId) -> Result<Option<Product>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, name, price, stock
            FROM product
            WHERE id = $1
            "#,
        )
        .bind(product_id.as_str())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("product", e))?;

        match row {
            Some(row) => {
                let product = ProductRow::from_row(&row)
                    .map_err(|e| StoreError::Backend(format!("malformed product row: {e}")))?;
                Ok(Some(product.try_into()?))
            }
            None => Ok(None),
        }
    }
}

/// Map SQLx errors to StoreError.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                // Serialization failure, deadlock victim, lock not available.
                Some("40001") | Some("40P01") | Some("55P03") => StoreError::Aborted(msg),
                _ => StoreError::Backend(msg),
            }
        }
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
            StoreError::Aborted(format!("connection pool unavailable in {operation}"))
        }
        sqlx::Error::Io(e) => StoreError::Aborted(format!("io error in {operation}: {e}")),
        other => StoreError::Backend(format!("sqlx error in {operation}: {other}")),
    }
}

// SQLx row types

#[derive(Debug)]
struct OrderRow {
    id: String,
    customer_id: Option<i32>,
    employee_id: Option<i32>,
    status: String,
    total_amount: i64,
    receiver: String,
    receive_phone: String,
    receive_address: String,
    note: Option<String>,
    receive_date: NaiveDate,
    receive_slot: String,
    placed_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for OrderRow {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        Ok(OrderRow {
            id: row.try_get("id")?,
            customer_id: row.try_get("customer_id")?,
            employee_id: row.try_get("employee_id")?,
            status: row.try_get("status")?,
            total_amount: row.try_get("total_amount")?,
            receiver: row.try_get("receiver")?,
            receive_phone: row.try_get("receive_phone")?,
            receive_address: row.try_get("receive_address")?,
            note: row.try_get("note")?,
            receive_date: row.try_get("receive_date")?,
            receive_slot: row.try_get("receive_slot")?,
            placed_at: row.try_get("placed_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl OrderRow {
    fn into_order(self, lines: Vec<OrderLine>) -> Result<Order, StoreError> {
        let id = OrderId::parse(&self.id)
            .map_err(|e| StoreError::Backend(format!("malformed order id: {e}")))?;
        let status = self
            .status
            .parse::<OrderStatus>()
            .map_err(|e| StoreError::Backend(format!("unknown status in orders row: {e}")))?;

        Ok(Order {
            id,
            customer: self.customer_id.map(CustomerId::from),
            employee: self.employee_id.map(EmployeeId::from),
            status,
            total: self.total_amount as u64,
            delivery: DeliveryDetails {
                receiver: self.receiver,
                phone: self.receive_phone,
                address: self.receive_address,
                note: self.note,
                date: self.receive_date,
                slot: self.receive_slot,
            },
            placed_at: self.placed_at,
            updated_at: self.updated_at,
            lines,
        })
    }
}

#[derive(Debug)]
struct LineRow {
    line_no: i32,
    prod_id: String,
    quantity: i64,
    unit_price: i64,
}

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for LineRow {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        Ok(LineRow {
            line_no: row.try_get("line_no")?,
            prod_id: row.try_get("prod_id")?,
            quantity: row.try_get("quantity")?,
            unit_price: row.try_get("unit_price")?,
        })
    }
}

impl TryFrom<LineRow> for OrderLine {
    type Error = StoreError;

    fn try_from(row: LineRow) -> Result<Self, Self::Error> {
        let product_id = ProductId::parse(&row.prod_id)
            .map_err(|e| StoreError::Backend(format!("malformed product id: {e}")))?;
        Ok(OrderLine {
            line_no: row.line_no as u32,
            product_id,
            quantity: row.quantity,
            unit_price: row.unit_price as u64,
        })
    }
}

#[derive(Debug)]
struct ProductRow {
    id: String,
    name: String,
    price: i64,
    stock: i64,
}

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for ProductRow {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        Ok(ProductRow {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            price: row.try_get("price")?,
            stock: row.try_get("stock")?,
        })
    }
}

impl TryFrom<ProductRow> for Product {
    type Error = StoreError;

    fn try_from(row: ProductRow) -> Result<Self, Self::Error> {
        let id = ProductId::parse(&row.id)
            .map_err(|e| StoreError::Backend(format!("malformed product id: {e}")))?;
        Ok(Product {
            id,
            name: row.name,
            price: row.price as u64,
            stock: row.stock,
        })
    }
}
