//! Seed the catalog from a YAML file.
//!
//! ```yaml
//! categories:
//!   - name: Casa
//!   - name: Cozinha
//!     parent: casa          # slug of a category listed earlier or already stored
//! products:
//!   - name: Caneca Térmica
//!     description: Mantém o café quente por 6 horas.
//!     price: "89.90"
//!     stock: 25
//!     category: cozinha
//! ```
//!
//! Slugs are derived from names when omitted. Entries whose slug already
//! exists are skipped, so a file can be applied more than once.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;
use tracing::{error, info, warn};

use mercado_core::slug::{is_valid_slug, slugify};
use mercado_core::{CategoryId, Price};
use mercado_server::db::categories::CategoryInput;
use mercado_server::db::products::ProductInput;
use mercado_server::db::{CategoryRepository, ProductRepository, RepositoryError};

#[derive(Debug, Deserialize)]
pub struct CatalogFile {
    #[serde(default)]
    pub categories: Vec<CategorySeed>,
    #[serde(default)]
    pub products: Vec<ProductSeed>,
}

#[derive(Debug, Deserialize)]
pub struct CategorySeed {
    pub name: String,
    pub slug: Option<String>,
    pub description: Option<String>,
    /// Slug of the parent category.
    pub parent: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ProductSeed {
    pub name: String,
    pub slug: Option<String>,
    #[serde(default)]
    pub description: String,
    pub price: Price,
    #[serde(default)]
    pub stock: i32,
    /// Slug of the product's category.
    pub category: Option<String>,
}

fn slug_for(name: &str, slug: Option<&str>) -> String {
    slug.map_or_else(|| slugify(name), str::to_owned)
}

impl CategorySeed {
    fn slug(&self) -> String {
        slug_for(&self.name, self.slug.as_deref())
    }
}

impl ProductSeed {
    fn slug(&self) -> String {
        slug_for(&self.name, self.slug.as_deref())
    }
}

/// Problems that would make seeding fail half-way, reported up front.
#[must_use]
pub fn validate_catalog(catalog: &CatalogFile) -> Vec<String> {
    let mut errors = Vec::new();

    for (i, category) in catalog.categories.iter().enumerate() {
        if category.name.trim().is_empty() {
            errors.push(format!("categories[{i}]: name is required"));
        }
        if !is_valid_slug(&category.slug()) {
            errors.push(format!("categories[{i}]: invalid slug {:?}", category.slug()));
        }
    }

    for (i, product) in catalog.products.iter().enumerate() {
        if product.name.trim().is_empty() {
            errors.push(format!("products[{i}]: name is required"));
        }
        if !is_valid_slug(&product.slug()) {
            errors.push(format!("products[{i}]: invalid slug {:?}", product.slug()));
        }
        if product.stock < 0 {
            errors.push(format!("products[{i}]: stock cannot be negative"));
        }
    }

    errors
}

/// Category id for `slug`, from this run or the database.
async fn resolve_category(
    categories: &CategoryRepository<'_>,
    ids: &mut HashMap<String, CategoryId>,
    slug: &str,
) -> Result<CategoryId, Box<dyn std::error::Error>> {
    if let Some(id) = ids.get(slug) {
        return Ok(*id);
    }
    let category = categories
        .get_by_slug(slug)
        .await?
        .ok_or_else(|| format!("unknown category slug: {slug}"))?;
    ids.insert(slug.to_owned(), category.id);
    Ok(category.id)
}

/// Seed categories and products from `path`.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed, fails validation,
/// references an unknown category, or a database operation fails.
pub async fn catalog(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    info!(path = %path.display(), "Loading catalog");
    let content = tokio::fs::read_to_string(path).await?;
    let catalog: CatalogFile = serde_yaml::from_str(&content)?;

    let errors = validate_catalog(&catalog);
    if !errors.is_empty() {
        error!("Catalog validation failed:");
        for err in &errors {
            error!("  - {err}");
        }
        return Err(format!("{} validation errors found", errors.len()).into());
    }

    let pool = super::connect().await?;
    let categories = CategoryRepository::new(&pool);
    let products = ProductRepository::new(&pool);

    let mut category_ids: HashMap<String, CategoryId> = HashMap::new();

    let (mut created, mut skipped) = (0_usize, 0_usize);
    for seed in &catalog.categories {
        let slug = seed.slug();
        if let Some(existing) = categories.get_by_slug(&slug).await? {
            category_ids.insert(slug, existing.id);
            skipped += 1;
            continue;
        }
        let parent_id = match seed.parent.as_deref() {
            Some(parent) => Some(resolve_category(&categories, &mut category_ids, parent).await?),
            None => None,
        };
        let category = categories
            .create(&CategoryInput {
                name: seed.name.trim().to_owned(),
                slug: slug.clone(),
                description: seed.description.clone(),
                parent_id,
            })
            .await?;
        category_ids.insert(slug, category.id);
        created += 1;
    }
    info!(created, skipped, "Categories seeded");

    let (mut created, mut skipped) = (0_usize, 0_usize);
    for seed in &catalog.products {
        let category_id = match seed.category.as_deref() {
            Some(slug) => Some(resolve_category(&categories, &mut category_ids, slug).await?),
            None => None,
        };
        let input = ProductInput {
            name: seed.name.trim().to_owned(),
            slug: seed.slug(),
            description: seed.description.clone(),
            price: seed.price,
            stock: seed.stock,
            category_id,
            store_id: None,
            active: true,
        };
        match products.create(&input).await {
            Ok(_) => created += 1,
            Err(RepositoryError::Conflict(_)) => {
                warn!(slug = %input.slug, "Product slug already exists, skipping");
                skipped += 1;
            }
            Err(e) => return Err(e.into()),
        }
    }
    info!(created, skipped, "Products seeded");

    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const CATALOG: &str = r#"
categories:
  - name: Casa
  - name: Cozinha
    parent: casa
products:
  - name: Caneca Térmica
    price: "89.90"
    stock: 25
    category: cozinha
  - name: Avental
    slug: avental-algodao
    price: "39.00"
"#;

    #[test]
    fn test_parse_catalog() {
        let catalog: CatalogFile = serde_yaml::from_str(CATALOG).unwrap();
        assert_eq!(catalog.categories.len(), 2);
        assert_eq!(catalog.categories[1].parent.as_deref(), Some("casa"));
        assert_eq!(catalog.products[0].slug(), "caneca-termica");
        assert_eq!(catalog.products[0].price, Price::from_cents(8_990));
        assert_eq!(catalog.products[1].slug(), "avental-algodao");
        assert_eq!(catalog.products[1].stock, 0);
        assert!(validate_catalog(&catalog).is_empty());
    }

    #[test]
    fn test_validation_reports_each_problem() {
        let catalog: CatalogFile = serde_yaml::from_str(
            r#"
products:
  - name: "  "
    price: "1.00"
    stock: -2
  - name: Mug
    slug: Bad Slug
    price: "10.00"
"#,
        )
        .unwrap();
        let errors = validate_catalog(&catalog);
        assert_eq!(errors.len(), 4, "{errors:?}");
        assert!(errors.iter().any(|e| e.contains("products[1]: invalid slug")));
    }

    #[test]
    fn test_negative_price_fails_to_parse() {
        let result = serde_yaml::from_str::<CatalogFile>(
            r#"
products:
  - name: Mug
    price: "-1.00"
"#,
        );
        assert!(result.is_err());
    }
}
