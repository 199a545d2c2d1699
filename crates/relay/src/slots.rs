//! Fixed table of the four device slots.
//!
//! Slots are kept in assignment order. A slot whose connection has gone away
//! without a clean release counts as free on the next registration, and a
//! release only frees the slot if the releasing connection still holds it.

use std::fmt;

use convoy_schemas::DeviceRole;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Identifier of one socket connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// State of one role slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Slot {
    #[default]
    Free,
    Occupied(ConnectionId),
}

/// Occupancy of one slot as reported by `/health`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotStatus {
    /// Role of the slot.
    pub role: DeviceRole,
    /// Connection holding the slot, if any.
    pub connection: Option<ConnectionId>,
}

/// The four role slots in priority order.
#[derive(Debug, Clone)]
pub struct SlotTable {
    slots: [(DeviceRole, Slot); 4],
}

impl Default for SlotTable {
    fn default() -> Self {
        Self::new()
    }
}

impl SlotTable {
    /// Create a table with every slot free.
    pub fn new() -> Self {
        Self {
            slots: DeviceRole::PRIORITY.map(|role| (role, Slot::Free)),
        }
    }

    /// Bind `id` to the first available slot in priority order.
    ///
    /// The requested role is only logged. Devices learn their actual role
    /// from the `role_assigned` reply.
    pub fn assign<F>(
        &mut self,
        id: ConnectionId,
        requested: Option<DeviceRole>,
        is_open: F,
    ) -> Option<DeviceRole>
    where
        F: Fn(ConnectionId) -> bool,
    {
        let available = |slot: &Slot| match slot {
            Slot::Free => true,
            Slot::Occupied(holder) => *holder == id || !is_open(*holder),
        };

        // A connection re-registering gives up whatever it held first.
        self.release(id);

        let index = self.slots.iter().position(|(_, slot)| available(slot))?;

        let entry = self.slots.get_mut(index)?;
        if let Slot::Occupied(stale) = entry.1 {
            debug!(role = %entry.0, connection = %stale, "Reclaiming slot from closed connection");
        }
        entry.1 = Slot::Occupied(id);
        if let Some(wanted) = requested {
            if wanted != entry.0 {
                debug!(requested = %wanted, assigned = %entry.0, "Requested role not honoured");
            }
        }
        info!(role = %entry.0, connection = %id, "Slot assigned");
        Some(entry.0)
    }

    /// Free the slot held by `id`, if any.
    pub fn release(&mut self, id: ConnectionId) -> Option<DeviceRole> {
        let entry = self
            .slots
            .iter_mut()
            .find(|(_, slot)| *slot == Slot::Occupied(id))?;
        entry.1 = Slot::Free;
        info!(role = %entry.0, connection = %id, "Slot released");
        Some(entry.0)
    }

    /// Connection holding `role`, if any.
    pub fn holder(&self, role: DeviceRole) -> Option<ConnectionId> {
        self.slots.iter().find_map(|(slot_role, slot)| match slot {
            Slot::Occupied(id) if *slot_role == role => Some(*id),
            _ => None,
        })
    }

    /// Role held by `id`, if any.
    pub fn role_of(&self, id: ConnectionId) -> Option<DeviceRole> {
        self.slots
            .iter()
            .find(|(_, slot)| *slot == Slot::Occupied(id))
            .map(|(role, _)| *role)
    }

    /// Occupancy of every slot in priority order.
    pub fn occupancy(&self) -> Vec<SlotStatus> {
        self.slots
            .iter()
            .map(|(role, slot)| SlotStatus {
                role: *role,
                connection: match slot {
                    Slot::Free => None,
                    Slot::Occupied(id) => Some(*id),
                },
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashSet;

    fn all_open(_: ConnectionId) -> bool {
        true
    }

    #[test]
    fn test_sequential_registrations_fill_in_order() {
        let mut table = SlotTable::new();
        let assigned: Vec<_> = (0..5)
            .map(|n| table.assign(ConnectionId(n), None, all_open))
            .collect();
        assert_eq!(
            assigned,
            vec![
                Some(DeviceRole::LEAD_MAIN),
                Some(DeviceRole::LEAD_REAR),
                Some(DeviceRole::TRAILING_MAIN),
                Some(DeviceRole::TRAILING_REAR),
                None,
            ]
        );
    }

    #[test]
    fn test_freed_slot_is_reassigned_first() {
        let mut table = SlotTable::new();
        for n in 0..4 {
            table.assign(ConnectionId(n), None, all_open);
        }
        assert_eq!(table.release(ConnectionId(1)), Some(DeviceRole::LEAD_REAR));
        table.release(ConnectionId(3));
        assert_eq!(
            table.assign(ConnectionId(9), None, all_open),
            Some(DeviceRole::LEAD_REAR)
        );
    }

    #[test]
    fn test_closed_holder_counts_as_free() {
        let mut table = SlotTable::new();
        table.assign(ConnectionId(1), None, all_open);
        table.assign(ConnectionId(2), None, all_open);
        let role = table.assign(ConnectionId(3), None, |id| id != ConnectionId(1));
        assert_eq!(role, Some(DeviceRole::LEAD_MAIN));

        // The crashed connection's late close must not free the new holder.
        assert_eq!(table.release(ConnectionId(1)), None);
        assert_eq!(table.holder(DeviceRole::LEAD_MAIN), Some(ConnectionId(3)));
    }

    #[test]
    fn test_requested_roles_do_not_change_priority_order() {
        let mut table = SlotTable::new();
        let requests = [
            DeviceRole::TRAILING_REAR,
            DeviceRole::TRAILING_MAIN,
            DeviceRole::TRAILING_REAR,
            DeviceRole::LEAD_MAIN,
        ];
        let assigned: Vec<_> = requests
            .into_iter()
            .zip(0u64..)
            .map(|(wanted, n)| table.assign(ConnectionId(n), Some(wanted), all_open))
            .collect();
        assert_eq!(assigned, DeviceRole::PRIORITY.map(Some).to_vec());
        assert_eq!(table.role_of(ConnectionId(0)), Some(DeviceRole::LEAD_MAIN));
    }

    #[test]
    fn test_reregistration_keeps_a_single_slot() {
        let mut table = SlotTable::new();
        table.assign(ConnectionId(1), None, all_open);
        table.assign(ConnectionId(1), Some(DeviceRole::LEAD_REAR), all_open);
        let held: Vec<_> = table.occupancy().into_iter().filter_map(|s| s.connection).collect();
        assert_eq!(held, vec![ConnectionId(1)]);
    }

    proptest! {
        #[test]
        fn prop_first_registration_takes_lead_main(wanted in prop::sample::select(DeviceRole::PRIORITY.to_vec())) {
            let mut table = SlotTable::new();
            prop_assert_eq!(table.assign(ConnectionId(1), Some(wanted), all_open), Some(DeviceRole::LEAD_MAIN));
        }

        #[test]
        fn prop_no_connection_holds_two_slots(ops in prop::collection::vec((0u64..6, any::<bool>()), 0..64)) {
            let mut table = SlotTable::new();
            for (id, register) in ops {
                if register {
                    table.assign(ConnectionId(id), None, all_open);
                } else {
                    table.release(ConnectionId(id));
                }
                let held: Vec<_> = table.occupancy().into_iter().filter_map(|s| s.connection).collect();
                let unique: HashSet<_> = held.iter().copied().collect();
                prop_assert_eq!(held.len(), unique.len());
            }
        }
    }
}
