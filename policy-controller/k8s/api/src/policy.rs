pub mod limiter;
pub mod ratelimit_policy;
pub mod target_ref;

pub use self::{
    limiter::{Limiter, LimiterLimit, LimiterSpec},
    ratelimit_policy::{
        Limit, MergeableRules, Rate, RateLimitPolicy, RateLimitPolicySpec, RateLimitPolicyStatus,
        WhenCondition,
    },
    target_ref::PolicyTargetReference,
};

pub(crate) fn targets_kind<T>(group: &str, kind: &str) -> bool
where
    T: kube::Resource,
    T::DynamicType: Default,
{
    let dt = Default::default();

    let mut t_group = &*T::group(&dt);
    if t_group.is_empty() {
        t_group = "core";
    }

    let group = if group.is_empty() { "core" } else { group };
    group.eq_ignore_ascii_case(t_group) && kind.eq_ignore_ascii_case(&T::kind(&dt))
}
