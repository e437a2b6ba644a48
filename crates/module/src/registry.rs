//! Operator registry handlers.
//!
//! Operators bond stake to take part in settlement votes. Stake only ever
//! decreases: through slashing, or all at once on deregistration.

use auction_types::{short_hex, Address, Operator, SlashRecord};
use tracing::{info, warn};

use crate::error::ModuleError;
use crate::events::ModuleEvent;
use crate::handlers::{CallContext, HandlerResult};
use crate::state::ModuleState;

/// Handle Register call. The attached value is the stake.
pub fn handle_register(state: &mut ModuleState, ctx: &CallContext) -> HandlerResult<()> {
    // An address is never reused, even after deregistration.
    if state.operators.contains_key(&ctx.sender) {
        return Err(ModuleError::AlreadyRegistered);
    }

    let required = state.registry.min_operator_stake;
    if ctx.value < required {
        return Err(ModuleError::InsufficientStake {
            required,
            got: ctx.value,
        });
    }

    let operator = Operator {
        address: ctx.sender,
        is_active: true,
        stake: ctx.value,
        deposited_stake: ctx.value,
        responses_submitted: 0,
        slashed_amount: 0,
        registered_at: ctx.timestamp,
    };

    state.operators.insert(ctx.sender, operator);
    state.operator_list.push(ctx.sender);
    state.total_active_operators += 1;
    state.emit(
        ctx.timestamp,
        ModuleEvent::OperatorRegistered {
            operator: ctx.sender,
            stake: ctx.value,
        },
    );

    info!(
        operator = short_hex(&ctx.sender),
        stake = ctx.value,
        active = state.total_active_operators,
        "Operator registered"
    );
    Ok(())
}

/// Handle Deregister call. Returns the refunded stake.
pub fn handle_deregister(state: &mut ModuleState, ctx: &CallContext) -> HandlerResult<u64> {
    let operator = state
        .operators
        .get_mut(&ctx.sender)
        .filter(|op| op.is_active)
        .ok_or(ModuleError::NotRegistered)?;

    let refund = operator.stake;
    operator.stake = 0;
    operator.is_active = false;
    state.total_active_operators -= 1;

    state.emit(
        ctx.timestamp,
        ModuleEvent::OperatorDeregistered {
            operator: ctx.sender,
            refund,
        },
    );

    info!(operator = short_hex(&ctx.sender), refund, "Operator deregistered");
    Ok(refund)
}

/// Handle Slash call from the configurer.
pub fn handle_slash(
    state: &mut ModuleState,
    ctx: &CallContext,
    operator: Address,
    amount: u64,
    reason: String,
) -> HandlerResult<u64> {
    if ctx.sender != state.configurer {
        return Err(ModuleError::NotAuthorized);
    }

    slash_operator(state, operator, amount, reason, ctx.timestamp)
}

/// Remove up to `amount` of stake from an active operator.
///
/// The deduction is capped at the current stake. An operator left with zero
/// stake is deactivated. Returns the amount actually slashed.
pub(crate) fn slash_operator(
    state: &mut ModuleState,
    address: Address,
    amount: u64,
    reason: String,
    now: u64,
) -> HandlerResult<u64> {
    let operator = state
        .operators
        .get_mut(&address)
        .filter(|op| op.is_active)
        .ok_or(ModuleError::NotRegistered)?;

    let slashed = amount.min(operator.stake);
    operator.stake -= slashed;
    operator.slashed_amount += slashed;

    let exhausted = operator.stake == 0;
    if exhausted {
        operator.is_active = false;
        state.total_active_operators -= 1;
    }

    warn!(
        operator = short_hex(&address),
        requested = amount,
        slashed,
        deactivated = exhausted,
        reason = %reason,
        "Operator slashed"
    );

    state.slash_log.push(SlashRecord {
        operator: address,
        amount: slashed,
        reason: reason.clone(),
        timestamp: now,
    });
    state.emit(
        now,
        ModuleEvent::OperatorSlashed {
            operator: address,
            amount: slashed,
            reason,
        },
    );

    Ok(slashed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::genesis::ModuleGenesisConfig;

    const ADMIN: [u8; 32] = [0xAA; 32];

    fn ctx(sender: [u8; 32], value: u64) -> CallContext {
        CallContext {
            sender,
            block_height: 1,
            timestamp: 100,
            value,
        }
    }

    fn setup() -> ModuleState {
        ModuleState::with_genesis(&ModuleGenesisConfig::with_admin(ADMIN))
    }

    fn assert_active_count(state: &ModuleState) {
        assert_eq!(state.total_active_operators, state.count_active_operators());
    }

    #[test]
    fn test_register() {
        let mut state = setup();
        handle_register(&mut state, &ctx([1u8; 32], 1_000)).unwrap();

        let op = state.operators.get(&[1u8; 32]).unwrap();
        assert!(op.is_active);
        assert_eq!(op.stake, 1_000);
        assert_eq!(state.operator_list, vec![[1u8; 32]]);
        assert_active_count(&state);
    }

    #[test]
    fn test_register_twice_fails() {
        let mut state = setup();
        handle_register(&mut state, &ctx([1u8; 32], 1_000)).unwrap();
        assert_eq!(
            handle_register(&mut state, &ctx([1u8; 32], 5_000)),
            Err(ModuleError::AlreadyRegistered)
        );
    }

    #[test]
    fn test_register_insufficient_stake() {
        let mut state = setup();
        assert_eq!(
            handle_register(&mut state, &ctx([1u8; 32], 999)),
            Err(ModuleError::InsufficientStake {
                required: 1_000,
                got: 999
            })
        );
        assert!(state.operators.is_empty());
    }

    #[test]
    fn test_deregister_refunds_remaining_stake() {
        let mut state = setup();
        handle_register(&mut state, &ctx([1u8; 32], 2_000)).unwrap();
        slash_operator(&mut state, [1u8; 32], 300, "test".into(), 100).unwrap();

        let refund = handle_deregister(&mut state, &ctx([1u8; 32], 0)).unwrap();
        assert_eq!(refund, 1_700);
        assert_eq!(state.total_active_operators, 0);
        assert_active_count(&state);

        assert_eq!(
            handle_deregister(&mut state, &ctx([1u8; 32], 0)),
            Err(ModuleError::NotRegistered)
        );
        assert_eq!(
            handle_register(&mut state, &ctx([1u8; 32], 2_000)),
            Err(ModuleError::AlreadyRegistered)
        );
    }

    #[test]
    fn test_slash_caps_at_stake() {
        let mut state = setup();
        handle_register(&mut state, &ctx([1u8; 32], 1_000)).unwrap();

        let slashed = slash_operator(&mut state, [1u8; 32], 5_000, "overdraw".into(), 100).unwrap();
        assert_eq!(slashed, 1_000);

        let op = state.operators.get(&[1u8; 32]).unwrap();
        assert_eq!(op.stake, 0);
        assert_eq!(op.slashed_amount, 1_000);
        assert!(!op.is_active);
        assert_active_count(&state);

        assert_eq!(state.slash_log.len(), 1);
        assert_eq!(state.slash_log[0].reason, "overdraw");
    }

    #[test]
    fn test_partial_slash_keeps_operator_active() {
        let mut state = setup();
        handle_register(&mut state, &ctx([1u8; 32], 1_000)).unwrap();
        slash_operator(&mut state, [1u8; 32], 400, "late".into(), 100).unwrap();

        let op = state.operators.get(&[1u8; 32]).unwrap();
        assert!(op.is_active);
        assert_eq!(op.stake + op.slashed_amount, op.deposited_stake);
        assert_active_count(&state);
    }

    #[test]
    fn test_slash_inactive_fails() {
        let mut state = setup();
        assert_eq!(
            slash_operator(&mut state, [1u8; 32], 10, "x".into(), 100),
            Err(ModuleError::NotRegistered)
        );

        handle_register(&mut state, &ctx([1u8; 32], 1_000)).unwrap();
        handle_deregister(&mut state, &ctx([1u8; 32], 0)).unwrap();
        assert_eq!(
            slash_operator(&mut state, [1u8; 32], 10, "x".into(), 100),
            Err(ModuleError::NotRegistered)
        );
        assert!(state.slash_log.is_empty());
    }

    #[test]
    fn test_slash_requires_configurer() {
        let mut state = setup();
        handle_register(&mut state, &ctx([1u8; 32], 1_000)).unwrap();

        let result = handle_slash(&mut state, &ctx([2u8; 32], 0), [1u8; 32], 10, "x".into());
        assert_eq!(result, Err(ModuleError::NotAuthorized));

        let result = handle_slash(&mut state, &ctx(ADMIN, 0), [1u8; 32], 10, "x".into());
        assert_eq!(result, Ok(10));
    }
}
