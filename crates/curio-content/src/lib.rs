//! # curio-content
//!
//! Content ingestion and per-variant enrichment for curio.
//!
//! Each content variant (image, text, file, url) has a [`ContentService`]
//! that writes new uploads as a small saga: resolve who may see the upload,
//! store the blob, insert the records, fan out one meta row per viewer. A
//! [`Compensation`] guard undoes the writes when a later step fails or the
//! call is cancelled.
//!
//! The same services compute item descriptions for the batch pipeline:
//! vision analysis and OCR for images, summaries for texts and files, link
//! previews for URLs.
//!
//! ## Example
//!
//! ```rust,ignore
//! use curio_content::{ContentServices, ServiceContext, Upload, UploadContext};
//!
//! let services = ContentServices::new(ctx);
//! let created = services
//!     .create(Upload::text("read later https://example.com"), &UploadContext::new(user))
//!     .await?;
//! ```

pub mod extract;
pub mod file;
pub mod image;
pub mod preview;
pub mod saga;
pub mod service;
pub mod text;
pub mod url;

pub use extract::{PageExtractor, PdfTextExtractor};
pub use file::FileService;
pub use image::ImageService;
pub use preview::{HttpLinkPreviewer, LinkPreview, LinkPreviewer};
pub use saga::{resolve_authorized_users, Compensation};
pub use service::{
    ContentService, ContentServices, Created, ServiceContext, Upload, UploadContext,
};
pub use text::TextService;
pub use url::UrlService;
