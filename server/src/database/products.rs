use std::collections::HashMap;

use async_trait::async_trait;
use hyper::StatusCode;
use shared::types::{Image, Product, ProductImage, Rate};
use sqlx::{Sqlite, SqlitePool, Transaction};
use thiserror::Error;

use crate::database::StoreError;

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("product {0} not found")]
    NotFound(i64),

    #[error("invalid product payload: {0}")]
    InvalidPayload(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl CatalogError {
    pub fn to_code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "NOT_FOUND",
            Self::InvalidPayload(_) => "INVALID_PAYLOAD",
            Self::Store(_) => "INTERNAL_ERROR",
        }
    }

    pub fn to_message(&self) -> String {
        match self {
            Self::NotFound(id) => format!("Product {} not found", id),
            Self::InvalidPayload(reason) => format!("Invalid product: {}", reason),
            Self::Store(_) => "Internal server error".to_string(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::InvalidPayload(_) => StatusCode::BAD_REQUEST,
            Self::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<sqlx::Error> for CatalogError {
    fn from(e: sqlx::Error) -> Self {
        CatalogError::Store(e.into())
    }
}

/// Catalog persistence
#[async_trait]
pub trait ProductStore: Send + Sync {
    async fn list(&self) -> Result<Vec<Product>, CatalogError>;

    async fn get(&self, id: i64) -> Result<Product, CatalogError>;

    /// Store a new product; any `id` on the input is ignored.
    async fn create(&self, product: Product) -> Result<Product, CatalogError>;

    /// Replace the product at `id`, images included.
    async fn update(&self, id: i64, product: Product) -> Result<Product, CatalogError>;

    async fn delete(&self, id: i64) -> Result<(), CatalogError>;
}

#[derive(Debug, sqlx::FromRow)]
struct ProductRow {
    id: i64,
    img_src: Option<String>,
    img_alt: Option<String>,
    name: String,
    sales: Option<i32>,
    stock: Option<i32>,
    price: Option<String>,
    rate_value: Option<f64>,
    rate_count: Option<i32>,
    categorie: Option<String>,
    colors: String,
    sizes: String,
    description: Option<String>,
    details: Option<String>,
}

#[derive(Debug, sqlx::FromRow)]
struct ImageRow {
    id: i64,
    product_id: i64,
    src: String,
    alt: Option<String>,
}

const SELECT_PRODUCTS: &str = "SELECT id, img_src, img_alt, name, sales, stock, price, rate_value, rate_count,
        categorie, colors, sizes, description, details FROM products";

impl ProductRow {
    fn into_product(self, images: Vec<ProductImage>) -> Result<Product, CatalogError> {
        Ok(Product {
            id: Some(self.id),
            img_url: self.img_src.map(|src| Image {
                src,
                alt: self.img_alt,
            }),
            name: self.name,
            sales: self.sales,
            stock: self.stock,
            price: self.price,
            rate: self.rate_value.map(|value| Rate {
                value,
                count: self.rate_count.unwrap_or(0),
            }),
            categorie: self.categorie,
            colors: decode_list(&self.colors)?,
            sizes: decode_list(&self.sizes)?,
            description: self.description,
            details: self.details,
            images_product: images,
        })
    }
}

fn decode_list(text: &str) -> Result<Vec<String>, CatalogError> {
    serde_json::from_str(text)
        .map_err(|e| CatalogError::Store(StoreError::Backend(format!("corrupt list column: {}", e))))
}

fn encode_list(list: &[String]) -> Result<String, CatalogError> {
    serde_json::to_string(list).map_err(|e| CatalogError::InvalidPayload(e.to_string()))
}

fn validate(product: &Product) -> Result<(), CatalogError> {
    if product.name.trim().is_empty() {
        return Err(CatalogError::InvalidPayload("name must not be empty".into()));
    }
    if product.stock.is_some_and(|s| s < 0) || product.sales.is_some_and(|s| s < 0) {
        return Err(CatalogError::InvalidPayload("stock and sales must not be negative".into()));
    }
    if product.images_product.iter().any(|i| i.src.trim().is_empty()) {
        return Err(CatalogError::InvalidPayload("image src must not be empty".into()));
    }
    Ok(())
}

fn to_image(row: ImageRow) -> ProductImage {
    ProductImage {
        id: Some(row.id),
        src: row.src,
        alt: row.alt,
    }
}

/// `products` + `product_images` tables
#[derive(Clone)]
pub struct SqliteProductStore {
    pool: SqlitePool,
}

impl SqliteProductStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn images_for(&self, product_id: i64) -> Result<Vec<ProductImage>, CatalogError> {
        let rows = sqlx::query_as::<_, ImageRow>(
            "SELECT id, product_id, src, alt FROM product_images WHERE product_id = ?1 ORDER BY id",
        )
        .bind(product_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(to_image).collect())
    }

    async fn insert_images(
        tx: &mut Transaction<'_, Sqlite>,
        product_id: i64,
        images: &[ProductImage],
    ) -> Result<(), CatalogError> {
        for image in images {
            sqlx::query("INSERT INTO product_images (product_id, src, alt) VALUES (?1, ?2, ?3)")
                .bind(product_id)
                .bind(&image.src)
                .bind(&image.alt)
                .execute(&mut **tx)
                .await?;
        }
        Ok(())
    }
}

#[async_trait]
impl ProductStore for SqliteProductStore {
    async fn list(&self) -> Result<Vec<Product>, CatalogError> {
        let rows = sqlx::query_as::<_, ProductRow>(&format!("{} ORDER BY id", SELECT_PRODUCTS))
            .fetch_all(&self.pool)
            .await?;

        let image_rows = sqlx::query_as::<_, ImageRow>(
            "SELECT id, product_id, src, alt FROM product_images ORDER BY product_id, id",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut images: HashMap<i64, Vec<ProductImage>> = HashMap::new();
        for row in image_rows {
            images.entry(row.product_id).or_default().push(to_image(row));
        }

        rows.into_iter()
            .map(|row| {
                let own = images.remove(&row.id).unwrap_or_default();
                row.into_product(own)
            })
            .collect()
    }

    async fn get(&self, id: i64) -> Result<Product, CatalogError> {
        let row = sqlx::query_as::<_, ProductRow>(&format!("{} WHERE id = ?1", SELECT_PRODUCTS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(CatalogError::NotFound(id))?;

        let images = self.images_for(id).await?;
        row.into_product(images)
    }

    async fn create(&self, product: Product) -> Result<Product, CatalogError> {
        validate(&product)?;
        let colors = encode_list(&product.colors)?;
        let sizes = encode_list(&product.sizes)?;

        let mut tx = self.pool.begin().await?;
        let result = sqlx::query(
            "INSERT INTO products (img_src, img_alt, name, sales, stock, price, rate_value, rate_count,
                categorie, colors, sizes, description, details)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
        )
        .bind(product.img_url.as_ref().map(|i| i.src.clone()))
        .bind(product.img_url.as_ref().and_then(|i| i.alt.clone()))
        .bind(&product.name)
        .bind(product.sales)
        .bind(product.stock)
        .bind(&product.price)
        .bind(product.rate.as_ref().map(|r| r.value))
        .bind(product.rate.as_ref().map(|r| r.count))
        .bind(&product.categorie)
        .bind(colors)
        .bind(sizes)
        .bind(&product.description)
        .bind(&product.details)
        .execute(&mut *tx)
        .await?;

        let id = result.last_insert_rowid();
        Self::insert_images(&mut tx, id, &product.images_product).await?;
        tx.commit().await?;

        self.get(id).await
    }

    async fn update(&self, id: i64, product: Product) -> Result<Product, CatalogError> {
        validate(&product)?;
        let colors = encode_list(&product.colors)?;
        let sizes = encode_list(&product.sizes)?;

        let mut tx = self.pool.begin().await?;
        let result = sqlx::query(
            "UPDATE products SET img_src = ?1, img_alt = ?2, name = ?3, sales = ?4, stock = ?5,
                price = ?6, rate_value = ?7, rate_count = ?8, categorie = ?9, colors = ?10,
                sizes = ?11, description = ?12, details = ?13
             WHERE id = ?14",
        )
        .bind(product.img_url.as_ref().map(|i| i.src.clone()))
        .bind(product.img_url.as_ref().and_then(|i| i.alt.clone()))
        .bind(&product.name)
        .bind(product.sales)
        .bind(product.stock)
        .bind(&product.price)
        .bind(product.rate.as_ref().map(|r| r.value))
        .bind(product.rate.as_ref().map(|r| r.count))
        .bind(&product.categorie)
        .bind(colors)
        .bind(sizes)
        .bind(&product.description)
        .bind(&product.details)
        .bind(id)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(CatalogError::NotFound(id));
        }

        sqlx::query("DELETE FROM product_images WHERE product_id = ?1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        Self::insert_images(&mut tx, id, &product.images_product).await?;
        tx.commit().await?;

        self.get(id).await
    }

    async fn delete(&self, id: i64) -> Result<(), CatalogError> {
        let result = sqlx::query("DELETE FROM products WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(CatalogError::NotFound(id));
        }
        Ok(())
    }
}
