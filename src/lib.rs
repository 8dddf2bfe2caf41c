#![crate_name = "ofp_monitor"]
#![crate_type = "lib"]

//! Codecs for the OpenFlow flow monitoring messages (monitor requests, flow updates, cancel,
//! pause and resume), flow removed notifications and request forwarding, across OpenFlow
//! 1.0 to 1.5 and the Nicira and ONF extensions that carried them before standardization.

mod bits;
pub mod flow_monitor;
pub mod flow_removed;
pub mod flow_update;
pub mod group_meter;
pub mod monitor_flags;
pub mod ofp_actions;
pub mod ofp_errors;
pub mod ofp_header;
pub mod ofp_match;
pub mod ofp_message;
pub mod ofp_parse;
pub mod ofp_port;
pub mod ofp_print;
pub mod ofp_protocol;
pub mod ofp_stats;
pub mod request_forward;
