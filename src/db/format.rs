use crate::db::Document;

/// Bookkeeping attributes the store adds to every document.
pub const INTERNAL_FIELDS: [&str; 5] = ["_attachments", "_etag", "_rid", "_ts", "_self"];

/// Strip store bookkeeping fields from a document in place.
pub fn format_object(doc: &mut Document) -> &mut Document {
    for field in INTERNAL_FIELDS {
        doc.remove(field);
    }
    doc
}

/// Strip store bookkeeping fields from every document in place.
pub fn format_objects(docs: &mut [Document]) -> &mut [Document] {
    for doc in docs.iter_mut() {
        format_object(doc);
    }
    docs
}
