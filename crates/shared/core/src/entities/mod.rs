mod cross;
mod notification;
mod order;
mod order_status;
mod order_type;
mod plan_order;
mod side;
mod symbol_info;
mod tracked_order;

pub use cross::InternalCross;
pub use notification::{Notification, NotificationData};
pub use order::{ExOrder, VenueOrder};
pub use order_status::OrderStatus;
pub use order_type::{ExecutionStyle, OrderType};
pub use plan_order::{PlanOrder, PlanOrderId};
pub use side::{AllowedSide, Side};
pub use symbol_info::SymbolInfo;
pub use tracked_order::{OrderState, TrackStatus, TrackedOrder};
