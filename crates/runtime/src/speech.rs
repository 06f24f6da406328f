//! Sentence segmentation for incremental speech playback.

/// Characters that end a sentence.
pub const SENTENCE_TERMINATORS: [char; 4] = ['.', '?', '!', '。'];

/// Downstream speech synthesis.
///
/// Receives sentences in emission order and owns queuing and playback.
pub trait SpeechSink: Send {
    fn on_sentence_ready(&mut self, sentence: &str);
}

impl<F> SpeechSink for F
where
    F: FnMut(&str) + Send,
{
    fn on_sentence_ready(&mut self, sentence: &str) {
        (self)(sentence)
    }
}

/// Splits streamed text into speakable sentences.
///
/// Emitted units are trimmed. Units made only of punctuation are not
/// emitted since there is nothing to say.
#[derive(Debug, Default)]
pub struct SentenceChunker {
    buf: String,
}

impl SentenceChunker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, delta: &str) {
        self.buf.push_str(delta);
    }

    /// Completed sentences currently buffered, cut lazily as the iterator
    /// is advanced.
    pub fn sentences(&mut self) -> Sentences<'_> {
        Sentences { chunker: self }
    }

    /// Cut the next completed sentence, if the buffer holds one.
    pub fn next_sentence(&mut self) -> Option<String> {
        loop {
            let end = sentence_end(&self.buf)?;
            let rest = self.buf.split_off(end);
            let unit = std::mem::replace(&mut self.buf, rest);
            if let Some(sentence) = speakable(&unit) {
                return Some(sentence);
            }
        }
    }

    /// Emit whatever remains, terminated or not.
    pub fn flush(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.buf);
        speakable(&rest)
    }

    pub fn reset(&mut self) {
        self.buf.clear();
    }

    pub fn buffered(&self) -> &str {
        &self.buf
    }
}

/// Iterator returned by [`SentenceChunker::sentences`].
pub struct Sentences<'a> {
    chunker: &'a mut SentenceChunker,
}

impl Iterator for Sentences<'_> {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        self.chunker.next_sentence()
    }
}

/// Byte offset just past the first run of terminators.
fn sentence_end(text: &str) -> Option<usize> {
    let (start, _) = text
        .char_indices()
        .find(|(_, c)| SENTENCE_TERMINATORS.contains(c))?;
    let end = text[start..]
        .char_indices()
        .find(|(_, c)| !SENTENCE_TERMINATORS.contains(c))
        .map_or(text.len(), |(i, _)| start + i);
    Some(end)
}

fn speakable(unit: &str) -> Option<String> {
    let unit = unit.trim();
    unit.chars()
        .any(|c| !c.is_whitespace() && !SENTENCE_TERMINATORS.contains(&c))
        .then(|| unit.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(chunker: &mut SentenceChunker, deltas: &[&str]) -> Vec<String> {
        let mut out = Vec::new();
        for delta in deltas {
            chunker.push(delta);
            out.extend(chunker.sentences());
        }
        out
    }

    #[test]
    fn korean_sentence_then_flush() {
        let mut chunker = SentenceChunker::new();
        let mut out = feed(&mut chunker, &["안녕하세요. 반갑습니다"]);
        out.extend(chunker.flush());
        assert_eq!(out, vec!["안녕하세요.", "반갑습니다"]);
    }

    #[test]
    fn sentences_across_deltas() {
        let mut chunker = SentenceChunker::new();
        let out = feed(&mut chunker, &["It is", " sunny", ". Want", " more? Sure! Ok"]);
        assert_eq!(out, vec!["It is sunny.", "Want more?", "Sure!"]);
        assert_eq!(chunker.buffered(), " Ok");
    }

    #[test]
    fn full_width_period_terminates() {
        let mut chunker = SentenceChunker::new();
        let out = feed(&mut chunker, &["今日は晴れです。明日"]);
        assert_eq!(out, vec!["今日は晴れです。"]);
        assert_eq!(chunker.flush().as_deref(), Some("明日"));
    }

    #[test]
    fn terminator_runs_stay_together() {
        let mut chunker = SentenceChunker::new();
        let out = feed(&mut chunker, &["Really?! Wait", "...", ". Done."]);
        assert_eq!(out, vec!["Really?!", "Wait...", "Done."]);
    }

    #[test]
    fn flush_skips_empty_and_punctuation_only() {
        let mut chunker = SentenceChunker::new();
        assert_eq!(chunker.flush(), None);
        chunker.push("   ");
        assert_eq!(chunker.flush(), None);
        chunker.push("!");
        assert_eq!(chunker.next_sentence(), None);
    }

    #[test]
    fn reset_clears_buffer() {
        let mut chunker = SentenceChunker::new();
        chunker.push("half a sent");
        chunker.reset();
        chunker.push("New one.");
        assert_eq!(chunker.sentences().collect::<Vec<_>>(), vec!["New one."]);
    }

    #[test]
    fn closures_are_sinks() {
        let mut heard = Vec::new();
        {
            let mut sink = |s: &str| heard.push(s.to_string());
            sink.on_sentence_ready("one.");
            sink.on_sentence_ready("two.");
        }
        assert_eq!(heard, vec!["one.", "two."]);
    }
}
