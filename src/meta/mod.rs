//! Meta types shared by every served resource: identifiers, object metadata,
//! request options and the failure `Status`.

mod identifier;
mod object;
mod options;
mod status;

pub use identifier::{GroupResource, GroupVersion, GroupVersionKind, GroupVersionResource};
pub use object::{list_kind, List, ListMeta, Object, ObjectList, ObjectMeta};
pub use options::{DeleteOptions, GetOptions, ListOptions, Preconditions};
pub use status::{Status, StatusCause, StatusDetails};
