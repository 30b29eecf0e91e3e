//! Proptest generators for property-based testing.

use proptest::prelude::*;

use crate::fixtures::Note;

/// A lookup value from a small alphabet, so generated records collide.
pub fn lookup_value() -> impl Strategy<Value = String> {
    "[a-d]".prop_map(String::from)
}

/// An optional category.
pub fn category() -> impl Strategy<Value = Option<String>> {
    proptest::option::of(lookup_value())
}

/// Parameters for a [`Note`].
#[derive(Debug, Clone)]
pub struct NoteParams {
    pub title: String,
    pub user: String,
    pub category: Option<String>,
}

impl NoteParams {
    pub fn note(&self) -> Note {
        Note {
            title: self.title.clone(),
            user: self.user.clone(),
            category: self.category.clone(),
            ..Note::default()
        }
    }
}

impl Arbitrary for NoteParams {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_: Self::Parameters) -> Self::Strategy {
        ("[a-z ]{0,16}", lookup_value(), category())
            .prop_map(|(title, user, category)| NoteParams {
                title,
                user,
                category,
            })
            .boxed()
    }
}

/// One step of a store workload. `slot` picks an existing record by
/// position (modulo the number created so far).
#[derive(Debug, Clone)]
pub enum StoreOp {
    Create(NoteParams),
    Update { slot: usize, params: NoteParams },
    SoftDelete { slot: usize },
    HardDelete { slot: usize },
    Restore { slot: usize },
}

impl Arbitrary for StoreOp {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_: Self::Parameters) -> Self::Strategy {
        prop_oneof![
            3 => any::<NoteParams>().prop_map(StoreOp::Create),
            3 => (any::<usize>(), any::<NoteParams>())
                .prop_map(|(slot, params)| StoreOp::Update { slot, params }),
            1 => any::<usize>().prop_map(|slot| StoreOp::SoftDelete { slot }),
            1 => any::<usize>().prop_map(|slot| StoreOp::HardDelete { slot }),
            1 => any::<usize>().prop_map(|slot| StoreOp::Restore { slot }),
        ]
        .boxed()
    }
}

/// A workload of up to `max_len` steps.
pub fn store_ops(max_len: usize) -> impl Strategy<Value = Vec<StoreOp>> {
    prop::collection::vec(any::<StoreOp>(), 1..=max_len)
}
