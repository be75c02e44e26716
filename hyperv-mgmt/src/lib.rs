//! hyperv-mgmt - Client side of the Hyper-V virtualization management namespace.
//!
//! Opens sessions against a host, invokes management methods with typed
//! parameter records and tracks the asynchronous jobs they may start.

pub mod classes;
pub mod error;
pub mod handle;
pub mod invoke;
pub mod job;
pub mod method;
pub mod probe;
pub mod provider;
pub mod query;
pub mod session;
pub mod sim;
pub mod transport;
pub mod value;

pub use error::{MgmtError, Result};
pub use handle::{ObjectPath, RemoteObjectHandle, SessionId};
pub use invoke::{MethodCallResult, invoke};
pub use job::{JobState, JobTracker, error_code_meaning};
pub use method::RemoteMethod;
pub use provider::{FreshSessions, PooledSessions, SessionProvider};
pub use query::Query;
pub use session::{Instance, ManagementSession, ServiceRole, VIRTUALIZATION_NAMESPACE};
pub use transport::{Connection, ManagementTransport, RawInstance, TransportError};
pub use value::{EmbeddedObject, Properties, PropertyMap, Value};
