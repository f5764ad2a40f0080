//! Shopping cart rules.

use serde::{Deserialize, Serialize};
use tracing::instrument;

use mercado_core::{Price, ProductId, UserId};

use crate::db::carts::CartLine;
use crate::db::{CartRepository, ProductRepository};
use crate::error::AppError;

/// Largest quantity of one product a cart line may hold.
pub const MAX_LINE_QUANTITY: i32 = 99;

#[derive(Debug, Clone, Deserialize, utoipa::ToSchema)]
pub struct AddToCart {
    pub product_id: ProductId,
    #[serde(default = "one")]
    pub quantity: i32,
}

const fn one() -> i32 {
    1
}

#[derive(Debug, Clone, Deserialize, utoipa::ToSchema)]
pub struct SetQuantity {
    /// Zero removes the line.
    pub quantity: i32,
}

/// One line as shown to the customer.
#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct CartItemView {
    pub product_id: ProductId,
    pub name: String,
    pub slug: String,
    pub image_url: Option<String>,
    pub unit_price: Price,
    pub quantity: i32,
    pub line_total: Price,
    /// False when the product was deactivated or stock dropped below the quantity.
    pub available: bool,
}

#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct CartView {
    pub items: Vec<CartItemView>,
    pub item_count: i64,
    pub subtotal: Price,
}

impl CartView {
    #[must_use]
    pub fn from_lines(lines: Vec<CartLine>) -> Self {
        let subtotal = lines.iter().map(CartLine::line_total).sum();
        let item_count = lines.iter().map(|line| i64::from(line.quantity)).sum();
        let items = lines
            .into_iter()
            .map(|line| CartItemView {
                line_total: line.line_total(),
                available: line.active && line.stock >= line.quantity,
                product_id: line.product_id,
                name: line.name,
                slug: line.slug,
                image_url: line.image_url,
                unit_price: line.unit_price,
                quantity: line.quantity,
            })
            .collect();

        Self {
            items,
            item_count,
            subtotal,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

fn check_quantity(quantity: i32) -> Result<(), AppError> {
    if (1..=MAX_LINE_QUANTITY).contains(&quantity) {
        Ok(())
    } else {
        Err(AppError::Validation(format!(
            "quantity must be between 1 and {MAX_LINE_QUANTITY}"
        )))
    }
}

pub struct CartService<'a> {
    carts: CartRepository<'a>,
    products: ProductRepository<'a>,
}

impl<'a> CartService<'a> {
    #[must_use]
    pub const fn new(pool: &'a sqlx::PgPool) -> Self {
        Self {
            carts: CartRepository::new(pool),
            products: ProductRepository::new(pool),
        }
    }

    /// The user's cart.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn view(&self, user_id: UserId) -> Result<CartView, AppError> {
        Ok(CartView::from_lines(self.carts.lines(user_id).await?))
    }

    /// Add units of a product, on top of what the cart already holds.
    ///
    /// # Errors
    ///
    /// `Validation` outside 1..=99, `NotFound` for inactive products,
    /// `Conflict` when the total exceeds stock.
    #[instrument(skip(self))]
    pub async fn add(&self, user_id: UserId, input: &AddToCart) -> Result<CartView, AppError> {
        check_quantity(input.quantity)?;

        let product = self
            .products
            .get_active(input.product_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Product not found".to_string()))?;

        let cart_id = self.carts.get_or_create(user_id).await?;
        let total = self.carts.quantity_of(cart_id, product.id).await? + input.quantity;
        if total > MAX_LINE_QUANTITY {
            return Err(AppError::Validation(format!(
                "a cart can hold at most {MAX_LINE_QUANTITY} units of one product"
            )));
        }
        if total > product.stock {
            return Err(AppError::Conflict(format!(
                "Only {} units of {} in stock",
                product.stock.max(0),
                product.name
            )));
        }

        self.carts.set_quantity(cart_id, product.id, total).await?;
        self.view(user_id).await
    }

    /// Replace a line's quantity; zero removes it.
    ///
    /// # Errors
    ///
    /// `NotFound` if the line or product is missing, `Conflict` above stock.
    #[instrument(skip(self))]
    pub async fn set_quantity(
        &self,
        user_id: UserId,
        product_id: ProductId,
        quantity: i32,
    ) -> Result<CartView, AppError> {
        if quantity == 0 {
            return self.remove(user_id, product_id).await;
        }
        check_quantity(quantity)?;

        let cart_id = self.carts.get_or_create(user_id).await?;
        if self.carts.quantity_of(cart_id, product_id).await? == 0 {
            return Err(AppError::NotFound("Item not in cart".to_string()));
        }

        let product = self
            .products
            .get_active(product_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Product not found".to_string()))?;
        if quantity > product.stock {
            return Err(AppError::Conflict(format!(
                "Only {} units of {} in stock",
                product.stock.max(0),
                product.name
            )));
        }

        self.carts.set_quantity(cart_id, product_id, quantity).await?;
        self.view(user_id).await
    }

    /// Remove a line.
    ///
    /// # Errors
    ///
    /// `NotFound` if the product is not in the cart.
    pub async fn remove(&self, user_id: UserId, product_id: ProductId) -> Result<CartView, AppError> {
        let cart_id = self.carts.get_or_create(user_id).await?;
        if !self.carts.remove(cart_id, product_id).await? {
            return Err(AppError::NotFound("Item not in cart".to_string()));
        }
        self.view(user_id).await
    }

    /// Empty the cart.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn clear(&self, user_id: UserId) -> Result<(), AppError> {
        self.carts.clear(user_id).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    fn line(id: i32, cents: i64, quantity: i32, stock: i32, active: bool) -> CartLine {
        CartLine {
            product_id: ProductId::new(id),
            name: format!("Product {id}"),
            slug: format!("product-{id}"),
            unit_price: Price::from_cents(cents),
            quantity,
            stock,
            active,
            image_url: None,
            added_at: Utc::now(),
        }
    }

    #[test]
    fn test_cart_view_totals() {
        let view = CartView::from_lines(vec![
            line(1, 1_990, 2, 10, true),
            line(2, 500, 3, 10, true),
        ]);

        assert_eq!(view.item_count, 5);
        assert_eq!(view.subtotal, Price::from_cents(5_480));
        assert_eq!(view.items[0].line_total, Price::from_cents(3_980));
        assert!(view.items.iter().all(|item| item.available));
    }

    #[test]
    fn test_cart_view_flags_unavailable() {
        let view = CartView::from_lines(vec![
            line(1, 1_000, 2, 1, true),
            line(2, 1_000, 1, 5, false),
        ]);
        assert!(!view.items[0].available);
        assert!(!view.items[1].available);
    }

    #[test]
    fn test_empty_cart() {
        let view = CartView::from_lines(Vec::new());
        assert!(view.is_empty());
        assert_eq!(view.subtotal, Price::ZERO);
        assert_eq!(view.item_count, 0);
    }

    #[test]
    fn test_check_quantity() {
        assert!(check_quantity(1).is_ok());
        assert!(check_quantity(99).is_ok());
        assert!(check_quantity(0).is_err());
        assert!(check_quantity(100).is_err());
        assert!(check_quantity(-3).is_err());
    }
}
