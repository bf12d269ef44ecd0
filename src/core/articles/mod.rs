pub mod article_models;
pub mod article_service;

pub use article_models::*;
pub use article_service::{ArticleError, ArticleService, ArticleStore};
