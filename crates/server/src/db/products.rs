//! Product repository: catalog reads, admin writes, and the stock steps used
//! inside checkout, cancellation and return transactions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgConnection, PgPool};

use mercado_core::{CategoryId, Price, ProductId, ProductImageId, StoreId};

use super::{Pagination, RepositoryError};

const PRODUCT_COLUMNS: &str = "p.id, p.name, p.slug, p.description, p.price, p.stock, \
     p.category_id, p.store_id, p.active, p.created_at, p.updated_at";

/// A catalog product.
#[derive(Debug, Clone, Serialize, sqlx::FromRow, utoipa::ToSchema)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub slug: String,
    pub description: String,
    pub price: Price,
    pub stock: i32,
    pub category_id: Option<CategoryId>,
    pub store_id: Option<StoreId>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A product as shown in listings, with its rating and cover image.
#[derive(Debug, Clone, Serialize, sqlx::FromRow, utoipa::ToSchema)]
pub struct ProductListing {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub product: Product,
    pub average_rating: Option<f64>,
    pub review_count: i64,
    pub image_url: Option<String>,
}

/// An image attached to a product.
#[derive(Debug, Clone, Serialize, sqlx::FromRow, utoipa::ToSchema)]
pub struct ProductImage {
    pub id: ProductImageId,
    pub product_id: ProductId,
    pub url: String,
    pub alt_text: Option<String>,
    pub position: i32,
}

/// Listing order for `GET /products`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ProductSort {
    #[default]
    Newest,
    PriceAsc,
    PriceDesc,
    Name,
    Rating,
}

impl ProductSort {
    const fn order_by(self) -> &'static str {
        match self {
            Self::Newest => "p.created_at DESC, p.id DESC",
            Self::PriceAsc => "p.price ASC, p.id",
            Self::PriceDesc => "p.price DESC, p.id",
            Self::Name => "p.name ASC, p.id",
            Self::Rating => "average_rating DESC NULLS LAST, review_count DESC, p.id",
        }
    }
}

/// Filters for the product listing.
#[derive(Debug, Clone, Default)]
pub struct ProductFilter {
    pub search: Option<String>,
    pub category_id: Option<CategoryId>,
    pub min_price: Option<Price>,
    pub max_price: Option<Price>,
    pub sort: ProductSort,
}

/// Fields for creating or replacing a product.
#[derive(Debug, Clone)]
pub struct ProductInput {
    pub name: String,
    pub slug: String,
    pub description: String,
    pub price: Price,
    pub stock: i32,
    pub category_id: Option<CategoryId>,
    pub store_id: Option<StoreId>,
    pub active: bool,
}

/// A product row locked for the rest of the transaction.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct LockedProduct {
    pub id: ProductId,
    pub name: String,
    pub price: Price,
    pub stock: i32,
    pub active: bool,
}

/// Repository for product database operations.
pub struct ProductRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> ProductRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// List active products matching `filter`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list(
        &self,
        filter: &ProductFilter,
        pagination: Pagination,
    ) -> Result<(Vec<ProductListing>, i64), RepositoryError> {
        let pattern = filter
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| format!("%{}%", s.to_lowercase()));

        let where_clause = r"
            p.active
            AND ($1::TEXT IS NULL OR LOWER(p.name) LIKE $1 OR LOWER(p.description) LIKE $1)
            AND ($2::INTEGER IS NULL OR p.category_id = $2)
            AND ($3::NUMERIC IS NULL OR p.price >= $3)
            AND ($4::NUMERIC IS NULL OR p.price <= $4)
        ";

        let sql = format!(
            r"
            SELECT {PRODUCT_COLUMNS},
                   (SELECT AVG(r.rating)::FLOAT8 FROM reviews r WHERE r.product_id = p.id) AS average_rating,
                   (SELECT COUNT(*) FROM reviews r WHERE r.product_id = p.id) AS review_count,
                   (SELECT i.url FROM product_images i WHERE i.product_id = p.id
                    ORDER BY i.position, i.id LIMIT 1) AS image_url
            FROM products p
            WHERE {where_clause}
            ORDER BY {order_by}
            LIMIT $5 OFFSET $6
            ",
            order_by = filter.sort.order_by(),
        );

        let products = sqlx::query_as::<_, ProductListing>(&sql)
            .bind(pattern.as_deref())
            .bind(filter.category_id)
            .bind(filter.min_price)
            .bind(filter.max_price)
            .bind(pagination.limit())
            .bind(pagination.offset())
            .fetch_all(self.pool)
            .await?;

        let count_sql = format!("SELECT COUNT(*) FROM products p WHERE {where_clause}");
        let total = sqlx::query_scalar::<_, i64>(&count_sql)
            .bind(pattern.as_deref())
            .bind(filter.category_id)
            .bind(filter.min_price)
            .bind(filter.max_price)
            .fetch_one(self.pool)
            .await?;

        Ok((products, total))
    }

    /// Most recently added active products.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn latest(&self, limit: i64) -> Result<Vec<ProductListing>, RepositoryError> {
        let filter = ProductFilter::default();
        let pagination = Pagination {
            page: Some(1),
            per_page: u32::try_from(limit).ok(),
        };
        let (products, _) = self.list(&filter, pagination).await?;
        Ok(products)
    }

    /// Get a product by ID, active or not.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get(&self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
        let product = sqlx::query_as::<_, Product>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products p WHERE p.id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        Ok(product)
    }

    /// Get an active product by ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_active(&self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
        Ok(self.get(id).await?.filter(|p| p.active))
    }

    /// Average rating and review count for a product.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn rating(&self, id: ProductId) -> Result<(Option<f64>, i64), RepositoryError> {
        let row = sqlx::query_as::<_, (Option<f64>, i64)>(
            "SELECT AVG(rating)::FLOAT8, COUNT(*) FROM reviews WHERE product_id = $1",
        )
        .bind(id)
        .fetch_one(self.pool)
        .await?;

        Ok(row)
    }

    /// Create a product.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` on a duplicate slug or a missing
    /// category/store.
    pub async fn create(&self, input: &ProductInput) -> Result<Product, RepositoryError> {
        sqlx::query_as::<_, Product>(
            r"
            INSERT INTO products (name, slug, description, price, stock, category_id, store_id, active)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING id, name, slug, description, price, stock, category_id, store_id, active,
                      created_at, updated_at
            ",
        )
        .bind(&input.name)
        .bind(&input.slug)
        .bind(&input.description)
        .bind(input.price)
        .bind(input.stock)
        .bind(input.category_id)
        .bind(input.store_id)
        .bind(input.active)
        .fetch_one(self.pool)
        .await
        .map_err(|e| RepositoryError::from_constraint(e, "product slug already exists or category/store is invalid"))
    }

    /// Replace a product's fields.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the product does not exist.
    pub async fn update(
        &self,
        id: ProductId,
        input: &ProductInput,
    ) -> Result<Product, RepositoryError> {
        sqlx::query_as::<_, Product>(
            r"
            UPDATE products
            SET name = $2, slug = $3, description = $4, price = $5, stock = $6,
                category_id = $7, store_id = $8, active = $9, updated_at = NOW()
            WHERE id = $1
            RETURNING id, name, slug, description, price, stock, category_id, store_id, active,
                      created_at, updated_at
            ",
        )
        .bind(id)
        .bind(&input.name)
        .bind(&input.slug)
        .bind(&input.description)
        .bind(input.price)
        .bind(input.stock)
        .bind(input.category_id)
        .bind(input.store_id)
        .bind(input.active)
        .fetch_optional(self.pool)
        .await
        .map_err(|e| RepositoryError::from_constraint(e, "product slug already exists or category/store is invalid"))?
        .ok_or(RepositoryError::NotFound)
    }

    /// Soft delete: the product disappears from the catalog but order history
    /// keeps referencing it.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the product does not exist.
    pub async fn deactivate(&self, id: ProductId) -> Result<(), RepositoryError> {
        let result =
            sqlx::query("UPDATE products SET active = FALSE, updated_at = NOW() WHERE id = $1")
                .bind(id)
                .execute(self.pool)
                .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    /// Add `delta` (possibly negative) to a product's stock.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if stock would go below zero and
    /// `RepositoryError::NotFound` if the product does not exist.
    pub async fn adjust_stock(
        &self,
        id: ProductId,
        delta: i32,
    ) -> Result<Product, RepositoryError> {
        let updated = sqlx::query_as::<_, Product>(
            r"
            UPDATE products
            SET stock = stock + $2, updated_at = NOW()
            WHERE id = $1 AND stock + $2 >= 0
            RETURNING id, name, slug, description, price, stock, category_id, store_id, active,
                      created_at, updated_at
            ",
        )
        .bind(id)
        .bind(delta)
        .fetch_optional(self.pool)
        .await?;

        match updated {
            Some(product) => Ok(product),
            None if self.get(id).await?.is_some() => Err(RepositoryError::Conflict(
                "stock cannot go below zero".to_owned(),
            )),
            None => Err(RepositoryError::NotFound),
        }
    }

    /// Images of a product in display order.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn images(&self, id: ProductId) -> Result<Vec<ProductImage>, RepositoryError> {
        let images = sqlx::query_as::<_, ProductImage>(
            r"
            SELECT id, product_id, url, alt_text, position
            FROM product_images
            WHERE product_id = $1
            ORDER BY position, id
            ",
        )
        .bind(id)
        .fetch_all(self.pool)
        .await?;

        Ok(images)
    }

    /// Append an image after the product's existing ones.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the product does not exist.
    pub async fn add_image(
        &self,
        id: ProductId,
        url: &str,
        alt_text: Option<&str>,
    ) -> Result<ProductImage, RepositoryError> {
        sqlx::query_as::<_, ProductImage>(
            r"
            INSERT INTO product_images (product_id, url, alt_text, position)
            VALUES ($1, $2, $3,
                    (SELECT COALESCE(MAX(position) + 1, 0) FROM product_images WHERE product_id = $1))
            RETURNING id, product_id, url, alt_text, position
            ",
        )
        .bind(id)
        .bind(url)
        .bind(alt_text)
        .fetch_one(self.pool)
        .await
        .map_err(|e| RepositoryError::from_constraint(e, "product does not exist"))
    }

    /// Count active products.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn count_active(&self) -> Result<i64, RepositoryError> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM products WHERE active")
            .fetch_one(self.pool)
            .await?;
        Ok(count)
    }
}

// =============================================================================
// Transaction steps
// =============================================================================

/// Lock the given products until the transaction ends.
///
/// Rows are locked in ID order so concurrent checkouts over overlapping carts
/// cannot deadlock.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn lock_for_update(
    conn: &mut PgConnection,
    ids: &[ProductId],
) -> Result<Vec<LockedProduct>, RepositoryError> {
    let products = sqlx::query_as::<_, LockedProduct>(
        r"
        SELECT id, name, price, stock, active
        FROM products
        WHERE id = ANY($1)
        ORDER BY id
        FOR UPDATE
        ",
    )
    .bind(ids)
    .fetch_all(conn)
    .await?;

    Ok(products)
}

/// Take `quantity` units out of stock.
///
/// # Errors
///
/// Returns `RepositoryError::Conflict` if not enough stock remains.
pub async fn decrement_stock(
    conn: &mut PgConnection,
    id: ProductId,
    quantity: i32,
) -> Result<(), RepositoryError> {
    let result = sqlx::query(
        r"
        UPDATE products SET stock = stock - $2, updated_at = NOW()
        WHERE id = $1 AND stock >= $2
        ",
    )
    .bind(id)
    .bind(quantity)
    .execute(conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(RepositoryError::Conflict(format!(
            "insufficient stock for product {id}"
        )));
    }
    Ok(())
}

/// Put `quantity` units back into stock.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn restore_stock(
    conn: &mut PgConnection,
    id: ProductId,
    quantity: i32,
) -> Result<(), RepositoryError> {
    sqlx::query("UPDATE products SET stock = stock + $2, updated_at = NOW() WHERE id = $1")
        .bind(id)
        .bind(quantity)
        .execute(conn)
        .await?;
    Ok(())
}
