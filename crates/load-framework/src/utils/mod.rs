/*
Copyright 2024-2025 The Spice.ai OSS Authors

Licensed under the Apache License, Version 2.0 (the "License");
you may not use this file except in compliance with the License.
You may obtain a copy of the License at

     https://www.apache.org/licenses/LICENSE-2.0

Unless required by applicable law or agreed to in writing, software
distributed under the License is distributed on an "AS IS" BASIS,
WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
See the License for the specific language governing permissions and
limitations under the License.
*/

use rand::Rng;
use std::{future::Future, time::Duration};

pub async fn wait_until_true<F, Fut>(max_wait: Duration, mut f: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let start = std::time::Instant::now();

    while start.elapsed() < max_wait {
        if f().await {
            return true;
        }

        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    false
}

pub(crate) fn get_random_element<T>(vec: &[T]) -> Option<&T> {
    if vec.is_empty() {
        None
    } else {
        let mut rng = rand::thread_rng();
        let index = rng.gen_range(0..vec.len());
        Some(&vec[index])
    }
}

/// Keep at most `max_chars` characters of `value`, respecting char boundaries.
#[must_use]
pub fn truncate_chars(value: &str, max_chars: usize) -> &str {
    match value.char_indices().nth(max_chars) {
        Some((idx, _)) => &value[..idx],
        None => value,
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_truncate_chars_respects_multibyte_boundaries() {
        assert_eq!(truncate_chars("échec", 2), "éc");
        assert_eq!(truncate_chars("short", 200), "short");
        assert_eq!(truncate_chars("", 3), "");
    }

    #[test]
    fn test_random_element_of_empty_slice() {
        let empty: Vec<u8> = vec![];
        assert!(get_random_element(&empty).is_none());
        assert_eq!(get_random_element(&[42]), Some(&42));
    }

    #[tokio::test]
    async fn test_wait_until_true_gives_up() {
        let mut calls = 0;
        let ok = wait_until_true(Duration::from_millis(250), || {
            calls += 1;
            async { false }
        })
        .await;
        assert!(!ok);
        assert!(calls >= 2);
    }
}
