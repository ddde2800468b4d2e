pub mod shopify;

pub use shopify::{
    cancelled_event,
    created_event,
    normalize_topic,
    order_event_data,
    refund_event,
    uninstalled_event,
    updated_event,
    EventConversionError,
};
