//! PDF object model and serialization module

mod catalog;
mod dict;
mod document;
mod filter;
mod handle;
mod object;
mod object_type;
mod predictor;
pub mod schema;
mod sink;
mod stream;
mod writer;
mod xref;

pub use catalog::{Catalog, DocumentInfo, Page, PageTree, Resources};
pub use dict::Dictionary;
pub use document::Document;
pub use filter::{Filter, FilterContext};
pub use handle::{Handle, WeakHandle};
pub use object::{Body, Linkage, LinkageKind, Object, ObjectId, GENERATION};
pub use object_type::ObjectType;
pub use predictor::PredictorParams;
pub use sink::ByteSink;
pub use stream::{FilterEntry, Stream, StreamState};
pub use writer::{PdfWriter, WriterOptions};
pub use xref::{XRefEntry, XRefTable};
