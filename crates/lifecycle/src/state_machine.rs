use campaign_core::error::{CampaignError, CampaignResult};
use campaign_core::event_bus::OutboxEvent;
use campaign_core::types::{Actor, Campaign, CampaignStatus, Role, UpdateCampaign};
use chrono::{DateTime, Utc};
use std::fmt;

use CampaignStatus::{Active, Expired, Paused, Pending, Rejected};

/// Something that happened to a campaign.
#[derive(Debug, Clone)]
pub enum LifecycleEvent {
    Approve,
    Reject { reason: String },
    PaymentSucceeded,
    Pause,
    Resume,
    Edit(UpdateCampaign),
    Delete,
    Expire,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Approve,
    Reject,
    PaymentSucceeded,
    Pause,
    Resume,
    Edit,
    Delete,
    Expire,
}

impl LifecycleEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            LifecycleEvent::Approve => EventKind::Approve,
            LifecycleEvent::Reject { .. } => EventKind::Reject,
            LifecycleEvent::PaymentSucceeded => EventKind::PaymentSucceeded,
            LifecycleEvent::Pause => EventKind::Pause,
            LifecycleEvent::Resume => EventKind::Resume,
            LifecycleEvent::Edit(_) => EventKind::Edit,
            LifecycleEvent::Delete => EventKind::Delete,
            LifecycleEvent::Expire => EventKind::Expire,
        }
    }
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Approve => "approve",
            EventKind::Reject => "reject",
            EventKind::PaymentSucceeded => "payment_succeeded",
            EventKind::Pause => "pause",
            EventKind::Resume => "resume",
            EventKind::Edit => "edit",
            EventKind::Delete => "delete",
            EventKind::Expire => "expire",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who may fire an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Authority {
    AdminOnly,
    OwnerOrAdmin,
    /// Payment gateway callbacks and the expiry sweep.
    System,
}

impl Authority {
    pub fn permits(&self, actor: &Actor, campaign: &Campaign) -> bool {
        match self {
            Authority::AdminOnly => actor.is_admin(),
            Authority::OwnerOrAdmin => actor.can_manage(campaign),
            Authority::System => actor.role == Role::System,
        }
    }
}

/// Field-level consequences of a transition, applied in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    ClearRejectionReason,
    StoreRejectionReason,
    MarkPaid,
    ApplyEdit,
    RemoveRecord,
    NotifyApproved,
    NotifyRejected,
}

/// Decides the next status or refuses the event.
pub type Guard = fn(&Campaign, &LifecycleEvent, DateTime<Utc>) -> CampaignResult<CampaignStatus>;

pub struct TransitionRule {
    pub from: &'static [CampaignStatus],
    pub event: EventKind,
    pub authority: Authority,
    pub guard: Guard,
    pub effects: &'static [Effect],
}

/// Every transition the engine knows. Adding one is a table entry.
pub static TRANSITIONS: &[TransitionRule] = &[
    TransitionRule {
        from: &[Pending],
        event: EventKind::Approve,
        authority: Authority::AdminOnly,
        guard: require_paid,
        effects: &[Effect::ClearRejectionReason, Effect::NotifyApproved],
    },
    TransitionRule {
        from: &[Pending],
        event: EventKind::Reject,
        authority: Authority::AdminOnly,
        guard: reject,
        effects: &[Effect::StoreRejectionReason, Effect::NotifyRejected],
    },
    TransitionRule {
        from: &[Pending],
        event: EventKind::PaymentSucceeded,
        authority: Authority::System,
        guard: activate,
        effects: &[Effect::MarkPaid, Effect::ClearRejectionReason, Effect::NotifyApproved],
    },
    // Duplicate or late gateway callbacks only record the payment.
    TransitionRule {
        from: &[Active, Paused],
        event: EventKind::PaymentSucceeded,
        authority: Authority::System,
        guard: unchanged,
        effects: &[Effect::MarkPaid],
    },
    TransitionRule {
        from: &[Active],
        event: EventKind::Pause,
        authority: Authority::OwnerOrAdmin,
        guard: pause,
        effects: &[],
    },
    TransitionRule {
        from: &[Paused],
        event: EventKind::Resume,
        authority: Authority::OwnerOrAdmin,
        guard: resume,
        effects: &[],
    },
    TransitionRule {
        from: &[Pending, Active, Paused],
        event: EventKind::Edit,
        authority: Authority::OwnerOrAdmin,
        guard: edit,
        effects: &[Effect::ApplyEdit],
    },
    TransitionRule {
        from: &[Pending, Active, Paused, Expired, Rejected],
        event: EventKind::Delete,
        authority: Authority::OwnerOrAdmin,
        guard: unchanged,
        effects: &[Effect::RemoveRecord],
    },
    TransitionRule {
        from: &[Active, Paused],
        event: EventKind::Expire,
        authority: Authority::System,
        guard: expire,
        effects: &[],
    },
];

fn require_paid(
    c: &Campaign,
    _: &LifecycleEvent,
    _: DateTime<Utc>,
) -> CampaignResult<CampaignStatus> {
    if !c.is_paid {
        return Err(CampaignError::PaymentRequired(
            "Campaign must be paid before it can be approved".to_string(),
        ));
    }
    Ok(Active)
}

fn activate(_: &Campaign, _: &LifecycleEvent, _: DateTime<Utc>) -> CampaignResult<CampaignStatus> {
    Ok(Active)
}

fn pause(_: &Campaign, _: &LifecycleEvent, _: DateTime<Utc>) -> CampaignResult<CampaignStatus> {
    Ok(Paused)
}

fn reject(
    _: &Campaign,
    event: &LifecycleEvent,
    _: DateTime<Utc>,
) -> CampaignResult<CampaignStatus> {
    match event {
        LifecycleEvent::Reject { reason } if !reason.trim().is_empty() => Ok(Rejected),
        _ => Err(CampaignError::Validation("A rejection reason is required".to_string())),
    }
}

fn unchanged(c: &Campaign, _: &LifecycleEvent, _: DateTime<Utc>) -> CampaignResult<CampaignStatus> {
    Ok(c.status)
}

// A not-yet-started campaign goes back to PENDING unless already paid.
fn resume(c: &Campaign, _: &LifecycleEvent, now: DateTime<Utc>) -> CampaignResult<CampaignStatus> {
    if c.end_date < now {
        return Err(CampaignError::CampaignExpired(
            "Campaign end date has passed; extend the dates before resuming".to_string(),
        ));
    }
    if c.start_date > now {
        return Ok(if c.is_paid { Active } else { Pending });
    }
    if !c.is_paid {
        return Err(CampaignError::PaymentRequired(
            "Campaign must be paid before it can run".to_string(),
        ));
    }
    Ok(Active)
}

fn edit(c: &Campaign, event: &LifecycleEvent, _: DateTime<Utc>) -> CampaignResult<CampaignStatus> {
    if let LifecycleEvent::Edit(update) = event {
        let start = update.start_date.unwrap_or(c.start_date);
        let end = update.end_date.unwrap_or(c.end_date);
        if end <= start {
            return Err(CampaignError::InvalidRange(
                "End date must be after start date".to_string(),
            ));
        }
        if update.title.as_deref().is_some_and(|t| t.trim().is_empty()) {
            return Err(CampaignError::Validation("Title cannot be empty".to_string()));
        }
    }
    Ok(c.status)
}

fn expire(c: &Campaign, _: &LifecycleEvent, now: DateTime<Utc>) -> CampaignResult<CampaignStatus> {
    if c.end_date >= now {
        return Err(CampaignError::InvalidState(
            "Campaign has not reached its end date".to_string(),
        ));
    }
    Ok(Expired)
}

/// A validated transition, not yet persisted.
#[derive(Debug, Clone)]
pub struct Transition {
    pub event: EventKind,
    pub from: CampaignStatus,
    /// The record as it should look afterwards.
    pub campaign: Campaign,
    pub effects: &'static [Effect],
    pub outbox: Vec<OutboxEvent>,
}

impl Transition {
    pub fn has(&self, effect: Effect) -> bool {
        self.effects.contains(&effect)
    }
}

/// Evaluate `event` against `campaign`: authorization first, then the
/// `(status, event)` table lookup, then the rule's guard.
pub fn transition(
    campaign: &Campaign,
    event: &LifecycleEvent,
    actor: &Actor,
    now: DateTime<Utc>,
) -> CampaignResult<Transition> {
    let kind = event.kind();
    let mut rules = TRANSITIONS.iter().filter(|r| r.event == kind).peekable();

    // Every rule for one event kind shares its authority.
    let authorized = rules
        .peek()
        .is_some_and(|r| r.authority.permits(actor, campaign));
    if !authorized {
        return Err(CampaignError::Unauthorized);
    }

    let rule = rules
        .find(|r| r.from.contains(&campaign.status))
        .ok_or_else(|| {
            CampaignError::InvalidState(format!(
                "Cannot {} a campaign that is {}",
                kind.as_str().replace('_', " "),
                campaign.status
            ))
        })?;

    let next_status = (rule.guard)(campaign, event, now)?;

    let mut next = campaign.clone();
    next.status = next_status;
    next.updated_at = now;
    let mut outbox = Vec::new();

    for effect in rule.effects {
        match effect {
            Effect::ClearRejectionReason => next.rejection_reason = None,
            Effect::StoreRejectionReason => {
                if let LifecycleEvent::Reject { reason } = event {
                    next.rejection_reason = Some(reason.trim().to_string());
                }
            }
            Effect::MarkPaid => next.is_paid = true,
            Effect::ApplyEdit => {
                if let LifecycleEvent::Edit(update) = event {
                    update.apply_to(&mut next);
                }
            }
            Effect::RemoveRecord => {}
            Effect::NotifyApproved => outbox.push(OutboxEvent::NotifyApproved {
                campaign: next.clone(),
            }),
            Effect::NotifyRejected => outbox.push(OutboxEvent::NotifyRejected {
                campaign: next.clone(),
                reason: next.rejection_reason.clone().unwrap_or_default(),
            }),
        }
    }

    if next.status != campaign.status {
        outbox.push(OutboxEvent::Transitioned {
            campaign_id: campaign.id,
            from: campaign.status,
            to: next.status,
            event: kind.as_str().to_string(),
            actor: *actor,
        });
    }

    Ok(Transition {
        event: kind,
        from: campaign.status,
        campaign: next,
        effects: rule.effects,
        outbox,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use campaign_core::types::AdType;
    use chrono::Duration;
    use rust_decimal::Decimal;
    use uuid::Uuid;

    fn campaign(status: CampaignStatus, is_paid: bool) -> Campaign {
        let now = Utc::now();
        Campaign {
            id: Uuid::new_v4(),
            title: "Summer launch".into(),
            ad_type: AdType::BannerTop,
            position: Some("HEADER".into()),
            image_url: "https://cdn.example.com/s.png".into(),
            target_link: "https://example.com/summer".into(),
            price: Decimal::from(250),
            is_paid,
            status,
            rejection_reason: None,
            start_date: now - Duration::days(1),
            end_date: now + Duration::days(6),
            impressions: 10,
            clicks: 1,
            owner_id: Uuid::new_v4(),
            created_at: now,
            updated_at: now,
        }
    }

    fn admin() -> Actor {
        Actor::admin(Uuid::new_v4())
    }

    #[test]
    fn test_approve_requires_payment() {
        let c = campaign(Pending, false);
        let err = transition(&c, &LifecycleEvent::Approve, &admin(), Utc::now()).unwrap_err();
        assert!(matches!(err, CampaignError::PaymentRequired(_)));
    }

    #[test]
    fn test_approve_paid_clears_reason_and_notifies() {
        let mut c = campaign(Pending, true);
        c.rejection_reason = Some("blurry image".into());
        let t = transition(&c, &LifecycleEvent::Approve, &admin(), Utc::now()).unwrap();
        assert_eq!(t.campaign.status, Active);
        assert_eq!(t.campaign.rejection_reason, None);
        assert!(matches!(t.outbox[0], OutboxEvent::NotifyApproved { .. }));
        assert!(matches!(
            t.outbox.last().unwrap(),
            OutboxEvent::Transitioned { from: Pending, to: Active, .. }
        ));
    }

    #[test]
    fn test_approve_and_reject_are_admin_only() {
        let c = campaign(Pending, true);
        let owner = Actor::advertiser(c.owner_id);
        assert!(matches!(
            transition(&c, &LifecycleEvent::Approve, &owner, Utc::now()),
            Err(CampaignError::Unauthorized)
        ));
        let reject = LifecycleEvent::Reject { reason: "spam".into() };
        assert!(matches!(
            transition(&c, &reject, &owner, Utc::now()),
            Err(CampaignError::Unauthorized)
        ));
    }

    #[test]
    fn test_reject_stores_reason() {
        let c = campaign(Pending, false);
        let event = LifecycleEvent::Reject { reason: "  misleading claims ".into() };
        let t = transition(&c, &event, &admin(), Utc::now()).unwrap();
        assert_eq!(t.campaign.status, Rejected);
        assert_eq!(t.campaign.rejection_reason.as_deref(), Some("misleading claims"));
        match &t.outbox[0] {
            OutboxEvent::NotifyRejected { reason, .. } => assert_eq!(reason, "misleading claims"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_reject_without_reason() {
        let c = campaign(Pending, false);
        let event = LifecycleEvent::Reject { reason: "   ".into() };
        assert!(matches!(
            transition(&c, &event, &admin(), Utc::now()),
            Err(CampaignError::Validation(_))
        ));
    }

    #[test]
    fn test_reject_only_from_pending() {
        let c = campaign(Active, true);
        let event = LifecycleEvent::Reject { reason: "late".into() };
        assert!(matches!(
            transition(&c, &event, &admin(), Utc::now()),
            Err(CampaignError::InvalidState(_))
        ));
    }

    #[test]
    fn test_payment_auto_approves_pending() {
        let c = campaign(Pending, false);
        let t = transition(&c, &LifecycleEvent::PaymentSucceeded, &Actor::system(), Utc::now())
            .unwrap();
        assert_eq!(t.campaign.status, Active);
        assert!(t.campaign.is_paid);
    }

    #[test]
    fn test_payment_on_paused_only_marks_paid() {
        let c = campaign(Paused, false);
        let t = transition(&c, &LifecycleEvent::PaymentSucceeded, &Actor::system(), Utc::now())
            .unwrap();
        assert_eq!(t.campaign.status, Paused);
        assert!(t.campaign.is_paid);
        assert!(t.outbox.is_empty());
    }

    #[test]
    fn test_payment_callback_needs_system_actor() {
        let c = campaign(Pending, false);
        let owner = Actor::advertiser(c.owner_id);
        assert!(matches!(
            transition(&c, &LifecycleEvent::PaymentSucceeded, &owner, Utc::now()),
            Err(CampaignError::Unauthorized)
        ));
    }

    #[test]
    fn test_pause_by_owner() {
        let c = campaign(Active, true);
        let owner = Actor::advertiser(c.owner_id);
        let t = transition(&c, &LifecycleEvent::Pause, &owner, Utc::now()).unwrap();
        assert_eq!(t.campaign.status, Paused);
    }

    #[test]
    fn test_pause_requires_active() {
        let c = campaign(Pending, true);
        let err = transition(&c, &LifecycleEvent::Pause, &admin(), Utc::now()).unwrap_err();
        assert!(matches!(err, CampaignError::InvalidState(_)));
        assert_eq!(
            err.to_string(),
            "Invalid campaign state: Cannot pause a campaign that is PENDING"
        );
    }

    #[test]
    fn test_stranger_cannot_pause() {
        let c = campaign(Active, true);
        let stranger = Actor::advertiser(Uuid::new_v4());
        assert!(matches!(
            transition(&c, &LifecycleEvent::Pause, &stranger, Utc::now()),
            Err(CampaignError::Unauthorized)
        ));
    }

    #[test]
    fn test_resume_after_expiry_fails() {
        let mut c = campaign(Paused, true);
        c.end_date = Utc::now() - Duration::days(1);
        c.start_date = c.end_date - Duration::days(5);
        let err = transition(&c, &LifecycleEvent::Resume, &admin(), Utc::now()).unwrap_err();
        assert!(matches!(err, CampaignError::CampaignExpired(_)));
    }

    #[test]
    fn test_resume_within_range() {
        let c = campaign(Paused, true);
        let t = transition(&c, &LifecycleEvent::Resume, &admin(), Utc::now()).unwrap();
        assert_eq!(t.campaign.status, Active);
    }

    #[test]
    fn test_resume_before_start_depends_on_payment() {
        let now = Utc::now();
        let mut paid = campaign(Paused, true);
        paid.start_date = now + Duration::days(2);
        paid.end_date = now + Duration::days(9);
        let t = transition(&paid, &LifecycleEvent::Resume, &admin(), now).unwrap();
        assert_eq!(t.campaign.status, Active);

        let mut unpaid = paid.clone();
        unpaid.is_paid = false;
        let t = transition(&unpaid, &LifecycleEvent::Resume, &admin(), now).unwrap();
        assert_eq!(t.campaign.status, Pending);
    }

    #[test]
    fn test_terminal_states_have_no_way_out() {
        for status in [Expired, Rejected] {
            let c = campaign(status, true);
            for event in [
                LifecycleEvent::Approve,
                LifecycleEvent::Pause,
                LifecycleEvent::Resume,
                LifecycleEvent::Edit(UpdateCampaign::default()),
            ] {
                assert!(matches!(
                    transition(&c, &event, &admin(), Utc::now()),
                    Err(CampaignError::InvalidState(_))
                ));
            }
        }
    }

    #[test]
    fn test_edit_validates_merged_dates() {
        let c = campaign(Active, true);
        let owner = Actor::advertiser(c.owner_id);
        let bad = UpdateCampaign {
            end_date: Some(c.start_date - Duration::hours(1)),
            ..Default::default()
        };
        assert!(matches!(
            transition(&c, &LifecycleEvent::Edit(bad), &owner, Utc::now()),
            Err(CampaignError::InvalidRange(_))
        ));

        let good = UpdateCampaign { title: Some("Summer launch v2".into()), ..Default::default() };
        let t = transition(&c, &LifecycleEvent::Edit(good), &owner, Utc::now()).unwrap();
        assert_eq!(t.campaign.title, "Summer launch v2");
        assert_eq!(t.campaign.status, Active);
        assert!(t.has(Effect::ApplyEdit));
        assert!(t.outbox.is_empty());
    }

    #[test]
    fn test_expire_is_system_only_and_date_gated() {
        let mut c = campaign(Active, true);
        assert!(matches!(
            transition(&c, &LifecycleEvent::Expire, &admin(), Utc::now()),
            Err(CampaignError::Unauthorized)
        ));
        assert!(matches!(
            transition(&c, &LifecycleEvent::Expire, &Actor::system(), Utc::now()),
            Err(CampaignError::InvalidState(_))
        ));
        c.end_date = Utc::now() - Duration::minutes(1);
        let t = transition(&c, &LifecycleEvent::Expire, &Actor::system(), Utc::now()).unwrap();
        assert_eq!(t.campaign.status, Expired);
    }

    #[test]
    fn test_counters_untouched_by_transitions() {
        let c = campaign(Active, true);
        let t = transition(&c, &LifecycleEvent::Pause, &admin(), Utc::now()).unwrap();
        assert_eq!(t.campaign.impressions, c.impressions);
        assert_eq!(t.campaign.clicks, c.clicks);
    }
}
