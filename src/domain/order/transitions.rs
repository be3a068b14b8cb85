use crate::domain::identity::Role;
use super::value_objects::OrderStatus;
use OrderStatus::*;

// ============================================================================
// Transition Tables
// ============================================================================
//
// Every status rule is data keyed by (role, current status). The global table
// gates all roles; the role tables narrow it.
//
// ============================================================================

const NONE: &[OrderStatus] = &[];

/// Transitions permitted for anyone, from each status
pub fn global_targets(from: OrderStatus) -> &'static [OrderStatus] {
    match from {
        Pending => &[Confirmed, Cancelled],
        Confirmed => &[Shipped, Cancelled],
        Shipped => &[Delivered, Cancelled],
        PartiallyCancelled => &[Cancelled],
        Delivered | Cancelled => NONE,
    }
}

fn seller_targets(from: OrderStatus) -> &'static [OrderStatus] {
    match from {
        Pending => &[Confirmed, Cancelled],
        Confirmed => &[Shipped, Cancelled],
        Shipped => &[Delivered],
        _ => NONE,
    }
}

fn user_targets(from: OrderStatus) -> &'static [OrderStatus] {
    match from {
        Pending => &[Cancelled],
        _ => NONE,
    }
}

/// Targets a role may request through a status change
pub fn role_targets(role: Role, from: OrderStatus) -> &'static [OrderStatus] {
    match role {
        Role::Admin => global_targets(from),
        Role::Seller => seller_targets(from),
        Role::User => user_targets(from),
    }
}

/// Statuses from which a role may use the dedicated cancel operation
pub fn cancellable_from(role: Role) -> &'static [OrderStatus] {
    match role {
        Role::Admin | Role::Seller => &[Pending, Confirmed],
        Role::User => &[Pending],
    }
}

/// The status a target may only be entered from, if any
pub fn required_predecessor(target: OrderStatus) -> Option<OrderStatus> {
    match target {
        Shipped => Some(Confirmed),
        Delivered => Some(Shipped),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_tables_never_exceed_global_table() {
        for role in [Role::Admin, Role::Seller, Role::User] {
            for from in OrderStatus::ALL {
                for target in role_targets(role, from) {
                    assert!(
                        global_targets(from).contains(target),
                        "{role} may not go {from} -> {target}"
                    );
                }
            }
        }
    }

    #[test]
    fn test_pending_to_shipped_is_never_allowed() {
        for role in [Role::Admin, Role::Seller, Role::User] {
            assert!(!role_targets(role, Pending).contains(&Shipped));
        }
    }

    #[test]
    fn test_terminal_states_have_no_targets() {
        for role in [Role::Admin, Role::Seller, Role::User] {
            assert!(role_targets(role, Delivered).is_empty());
            assert!(role_targets(role, Cancelled).is_empty());
        }
    }

    #[test]
    fn test_seller_cannot_cancel_after_shipping() {
        assert_eq!(seller_targets(Shipped), &[Delivered]);
        assert!(global_targets(Shipped).contains(&Cancelled));
    }

    #[test]
    fn test_user_only_cancels_pending() {
        assert_eq!(role_targets(Role::User, Pending), &[Cancelled]);
        assert!(role_targets(Role::User, Confirmed).is_empty());
        assert_eq!(cancellable_from(Role::User), &[Pending]);
    }
}
