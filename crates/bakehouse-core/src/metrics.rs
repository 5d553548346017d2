// Protocol metrics published through the `metrics` facade
// Names and descriptions live here; the binary installs the recorder

use metrics::describe_counter;

pub const PERMISSIONS_GRANTED_TOTAL: &str = "bakehouse_permissions_granted_total";
pub const MESSAGES_RELAYED_TOTAL: &str = "bakehouse_messages_relayed_total";
pub const MESSAGES_DROPPED_TOTAL: &str = "bakehouse_messages_dropped_total";

/// Describe every protocol metric on the installed recorder
pub fn describe_metrics() {
    describe_counter!(
        PERMISSIONS_GRANTED_TOTAL,
        "Total number of critical section permissions granted by the leader"
    );
    describe_counter!(
        MESSAGES_RELAYED_TOTAL,
        "Total number of messages forwarded for other nodes"
    );
    describe_counter!(
        MESSAGES_DROPPED_TOTAL,
        "Total number of messages dropped for lack of a route or a lock"
    );
}
