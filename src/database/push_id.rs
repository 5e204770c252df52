use std::sync::Mutex;

use rand::Rng;

const PUSH_CHARS: &[u8; 64] = b"-0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ_abcdefghijklmnopqrstuvwxyz";

struct PushState {
    last_push_time: u64,
    last_rand_chars: [u8; 12],
}

/// Produces 20-character child keys that sort in creation order.
///
/// The first eight characters encode the millisecond timestamp; the last
/// twelve are random, and are incremented instead of re-rolled when two ids
/// share a millisecond so ordering holds within the same tick.
pub struct PushIdGenerator {
    state: Mutex<PushState>,
}

impl Default for PushIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl PushIdGenerator {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(PushState {
                last_push_time: 0,
                last_rand_chars: [0; 12],
            }),
        }
    }

    pub fn next_id(&self) -> String {
        self.next_id_at(chrono::Utc::now().timestamp_millis().max(0) as u64)
    }

    pub(crate) fn next_id_at(&self, mut now: u64) -> String {
        let mut state = self.state.lock().unwrap();
        let duplicate_time = now == state.last_push_time;
        state.last_push_time = now;

        let mut timestamp_chars = [0u8; 8];
        for slot in timestamp_chars.iter_mut().rev() {
            *slot = PUSH_CHARS[(now % 64) as usize];
            now /= 64;
        }

        if !duplicate_time {
            let mut rng = rand::thread_rng();
            for char_slot in state.last_rand_chars.iter_mut() {
                *char_slot = rng.gen_range(0..64);
            }
        } else {
            let mut index = state.last_rand_chars.len();
            while index > 0 && state.last_rand_chars[index - 1] == 63 {
                state.last_rand_chars[index - 1] = 0;
                index -= 1;
            }
            if index > 0 {
                state.last_rand_chars[index - 1] += 1;
            }
        }

        let mut id = String::with_capacity(20);
        id.extend(timestamp_chars.iter().map(|&ch| ch as char));
        id.extend(
            state
                .last_rand_chars
                .iter()
                .map(|&index| PUSH_CHARS[index as usize] as char),
        );
        id
    }
}
