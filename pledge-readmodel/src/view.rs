//! Typed views over read models.

use pledge_core::{subject_tag, SubjectId, TagSet, TtlTier, READ_MODEL_TAG};

use crate::model::{RawData, ReadModel};

/// A concrete read-model type: where it is cached, for how long, under which
/// tags, and the typed accessors consumers use instead of the raw map.
pub trait ReadModelView: Sized + Send + Sync {
    /// Cache key prefix, unique per read-model type.
    const CACHE_PREFIX: &'static str;
    /// Tag shared by every entry of this type (models, pages, counts).
    const COLLECTION_TAG: &'static str;
    /// Default TTL tier for single models and pages.
    const TTL_TIER: TtlTier;

    /// Subject-specific tags derived from the builder output, on top of the
    /// base set (see [`cache_tags`](Self::cache_tags)).
    fn subject_tags(_id: &SubjectId, _data: &RawData) -> TagSet {
        TagSet::new()
    }

    /// Wrap a read model.
    fn from_model(model: ReadModel) -> Self;

    /// The wrapped read model.
    fn model(&self) -> &ReadModel;

    /// Full tag set: `read_model`, the collection tag, `<prefix>:<id>` and
    /// the subject tags.
    fn cache_tags(id: &SubjectId, data: &RawData) -> TagSet {
        let mut tags = TagSet::new()
            .with(READ_MODEL_TAG)
            .with(Self::COLLECTION_TAG)
            .with(subject_tag(Self::CACHE_PREFIX, id));
        tags.extend(Self::subject_tags(id, data));
        tags
    }

    /// Tags for collection-level entries (counts).
    fn collection_tags() -> TagSet {
        TagSet::new().with(READ_MODEL_TAG).with(Self::COLLECTION_TAG)
    }
}
