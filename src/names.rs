//! Stack names proposed by `init` when none is given

use rand::Rng;

const ADJECTIVES: &[&str] = &[
    "brisk", "careful", "dutiful", "fresh", "guarded", "hardy", "loyal", "nimble", "prompt",
    "quiet", "rested", "steady", "tidy", "trusty", "vigilant", "wary",
];

const NOUNS: &[&str] = &[
    "cipher", "custodian", "gate", "guardian", "key", "keeper", "latch", "lock", "ring",
    "rotor", "sentry", "tumbler", "turnkey", "vault", "warden", "watch",
];

/// A valid CloudFormation stack name such as "steady-warden-2847"
pub fn generate() -> String {
    generate_with(&mut rand::thread_rng())
}

fn generate_with(rng: &mut impl Rng) -> String {
    let pick = |words: &[&'static str], index: usize| words[index % words.len()];
    let adjective = pick(ADJECTIVES, rng.gen());
    let noun = pick(NOUNS, rng.gen());
    format!("{}-{}-{}", adjective, noun, rng.gen_range(1000..10000u16))
}
