use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

const MAX_THOUGHTS: usize = 8;
const WALK_SPEED: f32 = 0.6;
const GRAVITY: f32 = 0.35;
const JUMP_VELOCITY: f32 = 1.2;
const HUNGER_PER_TICK: f32 = 0.01;
const HAPPINESS_DECAY_PER_TICK: f32 = 0.005;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PetActivity {
    Idle,
    Walking,
    Jumping,
    Playing,
    Eating,
    Sleeping,
    Happy,
    Hungry,
    Shooting,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    Food,
    Yarn,
    Poop,
    Heart,
}

/// A decorative object on the pet rows. Airborne items fall under gravity
/// and everything disappears at its expiry timestamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FloatingItem {
    pub kind: ItemKind,
    pub x: f32,
    pub y: f32,
    pub vx: f32,
    pub vy: f32,
    pub expires_at: DateTime<Utc>,
}

/// Clicks on the pet widget resolve to one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PetInteraction {
    Feed,
    Play,
    Pet,
    Scoop,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PetCounters {
    pub feeds: u64,
    pub plays: u64,
    pub pets: u64,
    pub scoops: u64,
}

/// The toy pet. Persisted as JSON so it survives daemon restarts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PetState {
    pub x: f32,
    /// Rows above the ground line; 0 is the ground.
    pub y: f32,
    pub vx: f32,
    pub vy: f32,
    pub activity: PetActivity,
    /// 0 = starving, 100 = full.
    pub hunger: f32,
    /// 0 = miserable, 100 = delighted.
    pub happiness: f32,
    pub thoughts: VecDeque<String>,
    /// Horizontal scroll position of the thought marquee.
    pub marquee_offset: usize,
    pub items: Vec<FloatingItem>,
    pub next_poop_at: DateTime<Utc>,
    pub counters: PetCounters,
    /// Where the pet is currently headed, if anywhere.
    pub target_x: Option<f32>,
    /// What to do on arrival at the target.
    #[serde(default)]
    pub pending: Option<PendingAction>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PendingAction {
    Eat,
    Play,
}

impl Default for PetState {
    fn default() -> Self {
        Self {
            x: 2.0,
            y: 0.0,
            vx: 0.0,
            vy: 0.0,
            activity: PetActivity::Idle,
            hunger: 80.0,
            happiness: 80.0,
            thoughts: VecDeque::new(),
            marquee_offset: 0,
            items: Vec::new(),
            next_poop_at: Utc::now() + Duration::minutes(30),
            counters: PetCounters::default(),
            target_x: None,
            pending: None,
        }
    }
}

impl PetState {
    /// Advance the pet one animation frame. Returns true when anything a
    /// viewer could see changed.
    pub fn tick(&mut self, now: DateTime<Utc>, width: u16) -> bool {
        let mut changed = false;
        let max_x = width.saturating_sub(2).max(4) as f32;

        changed |= self.tick_physics(max_x);
        changed |= self.tick_items(now, max_x);
        changed |= self.tick_poop(now, max_x);
        changed |= self.tick_marquee(width);
        changed |= self.tick_mood();

        changed
    }

    fn tick_physics(&mut self, max_x: f32) -> bool {
        let mut changed = false;

        // Airborne: gravity until the ground stops us.
        if self.y > 0.0 || self.vy != 0.0 {
            self.vy -= GRAVITY;
            self.y += self.vy;
            if self.y <= 0.0 {
                self.y = 0.0;
                self.vy = 0.0;
                if self.activity == PetActivity::Jumping {
                    self.activity = PetActivity::Idle;
                }
            }
            changed = true;
        }

        if let Some(target) = self.target_x {
            let dx = target - self.x;
            if dx.abs() <= WALK_SPEED {
                self.x = target;
                self.target_x = None;
                self.arrive();
            } else {
                self.x += WALK_SPEED * dx.signum();
                self.activity = PetActivity::Walking;
            }
            changed = true;
        } else if self.activity == PetActivity::Idle && rand::thread_rng().gen_bool(0.01) {
            // Occasional wander keeps the ground row alive.
            self.target_x = Some(rand::thread_rng().gen_range(1.0..max_x));
            changed = true;
        }

        self.x = self.x.clamp(0.0, max_x);
        changed
    }

    /// Arrival at a walk target completes whatever the walk was for.
    fn arrive(&mut self) {
        match self.pending.take() {
            Some(PendingAction::Eat) => {
                let x = self.x;
                self.items
                    .retain(|i| !(i.kind == ItemKind::Food && (i.x - x).abs() < 1.5));
                self.hunger = (self.hunger + 25.0).min(100.0);
                self.activity = PetActivity::Eating;
            }
            Some(PendingAction::Play) => {
                let x = self.x;
                self.items
                    .retain(|i| !(i.kind == ItemKind::Yarn && (i.x - x).abs() < 1.5));
                self.happiness = (self.happiness + 15.0).min(100.0);
                self.activity = PetActivity::Playing;
            }
            None => self.activity = PetActivity::Idle,
        }
    }

    fn tick_items(&mut self, now: DateTime<Utc>, max_x: f32) -> bool {
        let before = self.items.len();
        self.items.retain(|i| i.expires_at > now);
        let mut changed = self.items.len() != before;

        for item in &mut self.items {
            if item.y > 0.0 || item.vy != 0.0 {
                item.vy -= GRAVITY;
                item.y += item.vy;
                item.x = (item.x + item.vx).clamp(0.0, max_x);
                if item.y <= 0.0 {
                    item.y = 0.0;
                    item.vy = 0.0;
                    item.vx = 0.0;
                }
                changed = true;
            }
        }
        changed
    }

    fn tick_poop(&mut self, now: DateTime<Utc>, max_x: f32) -> bool {
        if now < self.next_poop_at {
            return false;
        }
        let mut rng = rand::thread_rng();
        self.items.push(FloatingItem {
            kind: ItemKind::Poop,
            x: self.x.clamp(0.0, max_x),
            y: 0.0,
            vx: 0.0,
            vy: 0.0,
            expires_at: now + Duration::hours(2),
        });
        self.next_poop_at = now + Duration::minutes(rng.gen_range(20..60));
        true
    }

    fn tick_marquee(&mut self, width: u16) -> bool {
        let Some(thought) = self.thoughts.front() else {
            return false;
        };
        let visible = width.saturating_sub(4) as usize;
        if thought.chars().count() <= visible {
            return false;
        }
        self.marquee_offset = (self.marquee_offset + 1) % (thought.chars().count() + 3);
        true
    }

    fn tick_mood(&mut self) -> bool {
        self.hunger = (self.hunger - HUNGER_PER_TICK).max(0.0);
        self.happiness = (self.happiness - HAPPINESS_DECAY_PER_TICK).max(0.0);

        let derived = if self.hunger < 20.0 {
            Some(PetActivity::Hungry)
        } else if self.happiness > 90.0 {
            Some(PetActivity::Happy)
        } else {
            None
        };
        match derived {
            Some(a)
                if self.activity != a
                    && matches!(
                        self.activity,
                        PetActivity::Idle | PetActivity::Hungry | PetActivity::Happy
                    ) =>
            {
                self.activity = a;
                true
            }
            _ => false,
        }
    }

    /// Apply a user click. The widget maps ground/items-bar cells to one of
    /// these directly; they are not generic clickable regions.
    pub fn interact(&mut self, action: PetInteraction, now: DateTime<Utc>, width: u16) {
        let max_x = width.saturating_sub(2).max(4) as f32;
        let mut rng = rand::thread_rng();
        match action {
            PetInteraction::Feed => {
                let x = rng.gen_range(1.0..max_x);
                self.items.push(FloatingItem {
                    kind: ItemKind::Food,
                    x,
                    y: 3.0,
                    vx: 0.0,
                    vy: 0.0,
                    expires_at: now + Duration::minutes(10),
                });
                self.target_x = Some(x);
                self.pending = Some(PendingAction::Eat);
                self.counters.feeds += 1;
            }
            PetInteraction::Play => {
                let x = rng.gen_range(1.0..max_x);
                self.items.push(FloatingItem {
                    kind: ItemKind::Yarn,
                    x,
                    y: 2.0,
                    vx: rng.gen_range(-0.5..0.5),
                    vy: 0.4,
                    expires_at: now + Duration::minutes(10),
                });
                self.target_x = Some(x);
                self.pending = Some(PendingAction::Play);
                self.counters.plays += 1;
            }
            PetInteraction::Pet => {
                self.happiness = (self.happiness + 10.0).min(100.0);
                self.activity = PetActivity::Jumping;
                self.vy = JUMP_VELOCITY;
                self.items.push(FloatingItem {
                    kind: ItemKind::Heart,
                    x: self.x,
                    y: 2.0,
                    vx: 0.0,
                    vy: 0.2,
                    expires_at: now + Duration::seconds(5),
                });
                self.counters.pets += 1;
            }
            PetInteraction::Scoop => {
                let before = self.items.len();
                self.items.retain(|i| i.kind != ItemKind::Poop);
                if self.items.len() != before {
                    self.counters.scoops += 1;
                }
            }
        }
    }

    /// Push a fresh thought onto the ring, evicting the oldest.
    pub fn push_thought(&mut self, thought: String) {
        self.thoughts.push_front(thought);
        self.thoughts.truncate(MAX_THOUGHTS);
        self.marquee_offset = 0;
    }

    pub fn current_thought(&self) -> Option<&str> {
        self.thoughts.front().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ticked(pet: &mut PetState, n: usize) {
        let now = Utc::now();
        for _ in 0..n {
            pet.tick(now, 25);
        }
    }

    #[test]
    fn test_feed_walks_to_food_and_eats() {
        let mut pet = PetState {
            hunger: 50.0,
            ..PetState::default()
        };
        pet.interact(PetInteraction::Feed, Utc::now(), 25);
        assert_eq!(pet.counters.feeds, 1);
        assert!(pet.items.iter().any(|i| i.kind == ItemKind::Food));
        assert!(pet.target_x.is_some());

        ticked(&mut pet, 100);
        assert!(pet.target_x.is_none());
        assert!(pet.hunger > 50.0);
        assert!(!pet.items.iter().any(|i| i.kind == ItemKind::Food));
    }

    #[test]
    fn test_gravity_returns_pet_to_ground() {
        let mut pet = PetState::default();
        pet.interact(PetInteraction::Pet, Utc::now(), 25);
        assert!(pet.vy > 0.0);
        ticked(&mut pet, 50);
        assert_eq!(pet.y, 0.0);
        assert_eq!(pet.vy, 0.0);
    }

    #[test]
    fn test_scheduled_poop_spawns_once() {
        let mut pet = PetState {
            next_poop_at: Utc::now() - Duration::seconds(1),
            ..PetState::default()
        };
        let now = Utc::now();
        assert!(pet.tick(now, 25));
        let poops = pet.items.iter().filter(|i| i.kind == ItemKind::Poop).count();
        assert_eq!(poops, 1);
        assert!(pet.next_poop_at > now);

        pet.tick(now, 25);
        let poops = pet.items.iter().filter(|i| i.kind == ItemKind::Poop).count();
        assert_eq!(poops, 1);
    }

    #[test]
    fn test_scoop_removes_poop() {
        let mut pet = PetState {
            next_poop_at: Utc::now() - Duration::seconds(1),
            ..PetState::default()
        };
        pet.tick(Utc::now(), 25);
        pet.interact(PetInteraction::Scoop, Utc::now(), 25);
        assert!(!pet.items.iter().any(|i| i.kind == ItemKind::Poop));
        assert_eq!(pet.counters.scoops, 1);
    }

    #[test]
    fn test_expired_items_are_dropped() {
        let mut pet = PetState::default();
        pet.items.push(FloatingItem {
            kind: ItemKind::Heart,
            x: 1.0,
            y: 0.0,
            vx: 0.0,
            vy: 0.0,
            expires_at: Utc::now() - Duration::seconds(1),
        });
        assert!(pet.tick(Utc::now(), 25));
        assert!(pet.items.is_empty());
    }

    #[test]
    fn test_thought_ring_is_bounded() {
        let mut pet = PetState::default();
        for i in 0..20 {
            pet.push_thought(format!("thought {i}"));
        }
        assert_eq!(pet.thoughts.len(), MAX_THOUGHTS);
        assert_eq!(pet.current_thought(), Some("thought 19"));
    }

    #[test]
    fn test_long_thought_scrolls_marquee() {
        let mut pet = PetState::default();
        pet.push_thought("a".repeat(60));
        let before = pet.marquee_offset;
        pet.tick(Utc::now(), 25);
        assert_ne!(pet.marquee_offset, before);

        // Short thoughts never scroll.
        pet.push_thought("hi".into());
        let before = pet.marquee_offset;
        pet.tick(Utc::now(), 25);
        assert_eq!(pet.marquee_offset, before);
    }
}
