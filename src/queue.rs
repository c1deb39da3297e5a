use std::ops::Range;

use rand::Rng;
use rand::seq::SliceRandom;
use tracing::debug;

use crate::error::{Error, Result};
use crate::model::track::Track;

/// How the queue behaves once a track finishes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RepeatMode {
    /// Finished tracks are removed.
    #[default]
    Off,
    /// The current track is played again.
    Track,
    /// Finished tracks are moved to the back of the queue.
    Queue
}

/// Ordered list of tracks. Index order is playback order.
#[derive(Debug, Clone, Default)]
pub struct Queue {
    tracks: Vec<Track>
}

impl Queue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a track at `position`, appending when it is `None` or past the end.
    pub fn add(&mut self, track: Track, position: Option<usize>) {
        match position {
            Some(index) if index < self.tracks.len() => self.tracks.insert(index, track),
            _ => self.tracks.push(track)
        }
    }

    pub fn extend(&mut self, tracks: impl IntoIterator<Item = Track>) {
        self.tracks.extend(tracks);
    }

    pub fn remove(&mut self, index: usize) -> Option<Track> {
        (index < self.tracks.len()).then(|| self.tracks.remove(index))
    }

    pub fn get(&self, index: usize) -> Option<&Track> {
        self.tracks.get(index)
    }

    pub fn index_of(&self, track: &Track) -> Option<usize> {
        self.index_of_encoded(track.encoded())
    }

    /// Position of the first track whose encoded form is `encoded`.
    pub fn index_of_encoded(&self, encoded: &str) -> Option<usize> {
        self.tracks.iter().position(|t| t.encoded() == encoded)
    }

    /// Moves the track at `from` so that it ends up at index `to`.
    pub fn move_track(&mut self, from: usize, to: usize) -> Result<()> {
        if to >= self.tracks.len() {
            return Err(Error::validation(format!(
                "new position {to} is out of range for a queue of {} tracks",
                self.tracks.len()
            )));
        }

        let track = self.remove(from)
            .ok_or_else(|| Error::validation(format!("no track found at position {from}")))?;
        self.tracks.insert(to, track);

        Ok(())
    }

    /// Removes and returns every track in `range`.
    pub fn drain(&mut self, range: Range<usize>) -> Result<Vec<Track>> {
        if range.start >= range.end || range.end > self.tracks.len() {
            return Err(Error::validation(format!(
                "range {range:?} is invalid for a queue of {} tracks",
                self.tracks.len()
            )));
        }

        Ok(self.tracks.drain(range).collect())
    }

    pub fn shuffle(&mut self) {
        self.shuffle_with(&mut rand::thread_rng());
    }

    /// Fisher-Yates shuffle using the given random source.
    pub fn shuffle_with<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        self.tracks.shuffle(rng);
        debug!("Shuffled queue of {} tracks", self.tracks.len());
    }

    /// Removes every track, returning them in order.
    pub fn clear(&mut self) -> Vec<Track> {
        std::mem::take(&mut self.tracks)
    }

    /// Total length of all tracks in milliseconds.
    pub fn duration(&self) -> u64 {
        self.tracks.iter().map(|t| t.length).sum()
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Track> {
        self.tracks.iter()
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }
}

impl<'a> IntoIterator for &'a Queue {
    type Item = &'a Track;
    type IntoIter = std::slice::Iter<'a, Track>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::track::tests::track;
    use pretty_assertions::assert_eq;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn queue_of(n: usize) -> Queue {
        let mut queue = Queue::new();
        queue.extend((0..n).map(|i| track(&format!("track {i}"), 1_000 * (i as u64 + 1))));
        queue
    }

    fn titles(queue: &Queue) -> Vec<String> {
        queue.iter().map(|t| t.title.clone()).collect()
    }

    #[test]
    fn add_respects_position() {
        let mut queue = queue_of(2);
        queue.add(track("front", 1), Some(0));
        queue.add(track("middle", 1), Some(2));
        queue.add(track("back", 1), Some(99));
        queue.add(track("last", 1), None);

        assert_eq!(titles(&queue), ["front", "track 0", "middle", "track 1", "back", "last"]);
    }

    #[test]
    fn add_then_remove_keeps_size() {
        for position in 0..4 {
            let mut queue = queue_of(3);
            let added = track("extra", 5);
            queue.add(added.clone(), Some(position));
            let at = queue.index_of(&added).unwrap();
            assert_eq!(queue.remove(at), Some(added));
            assert_eq!(queue.len(), 3);
        }
    }

    #[test]
    fn out_of_range_is_not_found() {
        let mut queue = queue_of(2);

        assert!(queue.get(2).is_none());
        assert!(queue.remove(2).is_none());
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn clear_empties_queue() {
        for n in 0..4 {
            let mut queue = queue_of(n);
            assert_eq!(queue.clear().len(), n);
            assert_eq!(queue.len(), 0);
            assert!(queue.is_empty());
        }
    }

    #[test]
    fn shuffle_is_a_permutation() {
        let mut rng = StdRng::seed_from_u64(7);

        for n in 0..16 {
            let mut queue = queue_of(n);
            let mut before = titles(&queue);
            queue.shuffle_with(&mut rng);
            let mut after = titles(&queue);

            before.sort();
            after.sort();
            assert_eq!(before, after);
        }

        let mut queue = queue_of(5);
        queue.shuffle();
        assert_eq!(queue.len(), 5);
    }

    #[test]
    fn duration_sums_lengths() {
        assert_eq!(queue_of(0).duration(), 0);
        assert_eq!(queue_of(3).duration(), 6_000);
    }

    #[test]
    fn move_track_reorders() {
        let mut queue = queue_of(4);
        queue.move_track(0, 3).unwrap();
        assert_eq!(titles(&queue), ["track 1", "track 2", "track 3", "track 0"]);

        assert!(matches!(queue.move_track(0, 4), Err(Error::Validation(_))));
        assert!(matches!(queue.move_track(9, 0), Err(Error::Validation(_))));
    }

    #[test]
    fn drain_removes_range() {
        let mut queue = queue_of(5);
        let drained = queue.drain(1..3).unwrap();

        assert_eq!(drained.len(), 2);
        assert_eq!(titles(&queue), ["track 0", "track 3", "track 4"]);
        assert!(queue.drain(2..2).is_err());
        assert!(queue.drain(0..9).is_err());
    }

    #[test]
    fn index_of_matches_encoded_form() {
        let queue = queue_of(3);
        let second = queue.get(1).unwrap().clone();

        assert_eq!(queue.index_of_encoded(second.encoded()), Some(1));
        assert_eq!(queue.index_of(&track("missing", 1)), None);
    }
}
