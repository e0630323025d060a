//! Where the user is in the mapper -> dataset -> query flow.

mod capabilities;
mod requests;
mod state;

pub use capabilities::Capabilities;
pub use requests::{RequestTicket, RequestTracker};
pub use state::{
    reduce, ContentInfo, DatasetInfo, Datasets, MapperInfo, QueryInfo, SessionAction, SessionState,
    TransitionError,
};

pub use crate::upload::MediaKind;
