use automation_core::logger::MachineUpdate;
use proptest::prelude::*;

/// Strategy for generating tag names in dotted notation
pub fn tag_name_strategy() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_]{0,15}(\\.[a-z][a-z0-9_]{0,15}){0,2}"
}

/// Strategy for generating a sequence of integer writes
pub fn write_sequence_strategy() -> impl Strategy<Value = Vec<i64>> {
    prop::collection::vec(any::<i64>(), 1..64)
}

/// Strategy for generating partial machine updates
pub fn machine_update_strategy() -> impl Strategy<Value = MachineUpdate> {
    (
        prop::option::of(0i64..3600),
        prop::option::of("[a-zA-Z0-9 ]{0,32}"),
        prop::option::of("[a-z]{0,12}"),
        prop::option::of(0i64..1000),
        prop::option::of(prop_oneof![Just("forward".to_string()), Just("backward".to_string())]),
        prop::option::of(0i64..5),
        prop::option::of(0i64..10),
    )
        .prop_map(
            |(interval, description, classification, buffer_size, buffer_roll_type, criticity, priority)| {
                MachineUpdate {
                    name: "pump1".to_string(),
                    interval,
                    description,
                    classification,
                    buffer_size,
                    buffer_roll_type,
                    criticity,
                    priority,
                }
            },
        )
}
