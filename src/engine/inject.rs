//! Toolbar injection into HTML bodies.

use bytes::{Bytes, BytesMut};

/// Literal insertion point.
pub const CLOSING_BODY_TAG: &[u8] = b"</body>";

/// Rewrites body fragments, inserting the toolbar before `</body>`.
///
/// Markup is produced lazily by `render` on the first fragment that contains
/// a closing tag and reused for any later one. If rendering fails the
/// fragments pass through untouched.
pub struct ToolbarInjector<F> {
    render: Option<F>,
    markup: Option<Bytes>,
    injections: usize,
}

impl<F, E> ToolbarInjector<F>
where
    F: FnOnce() -> Result<String, E>,
    E: std::fmt::Display,
{
    pub fn new(render: F) -> Self {
        Self {
            render: Some(render),
            markup: None,
            injections: 0,
        }
    }

    /// Number of fragments rewritten so far.
    pub fn injections(&self) -> usize {
        self.injections
    }

    /// Replace the first `</body>` of `fragment` with markup followed by `</body>`.
    pub fn inject(&mut self, fragment: &Bytes) -> Bytes {
        let Some(at) = find(fragment, CLOSING_BODY_TAG) else {
            return fragment.clone();
        };
        let Some(markup) = self.markup() else {
            return fragment.clone();
        };

        let mut out = BytesMut::with_capacity(fragment.len() + markup.len());
        out.extend_from_slice(&fragment[..at]);
        out.extend_from_slice(&markup);
        out.extend_from_slice(&fragment[at..]);
        self.injections += 1;
        out.freeze()
    }

    fn markup(&mut self) -> Option<Bytes> {
        if let Some(render) = self.render.take() {
            match render() {
                Ok(html) => self.markup = Some(Bytes::from(html)),
                Err(e) => tracing::warn!(error = %e, "Toolbar render failed, skipping injection"),
            }
        }
        self.markup.clone()
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn ok(calls: &Cell<u32>) -> impl FnOnce() -> Result<String, String> + '_ {
        move || {
            calls.set(calls.get() + 1);
            Ok("<tb/>".to_owned())
        }
    }

    #[test]
    fn test_injects_before_first_closing_tag() {
        let calls = Cell::new(0);
        let mut injector = ToolbarInjector::new(ok(&calls));
        let out = injector.inject(&Bytes::from("<body>a</body>b</body>"));
        assert_eq!(out, Bytes::from("<body>a<tb/></body>b</body>"));
        assert_eq!(injector.injections(), 1);
    }

    #[test]
    fn test_fragment_without_tag_untouched_and_render_deferred() {
        let calls = Cell::new(0);
        let mut injector = ToolbarInjector::new(ok(&calls));
        let out = injector.inject(&Bytes::from("<html><body>hi"));
        assert_eq!(out, Bytes::from("<html><body>hi"));
        assert_eq!(calls.get(), 0);
        assert_eq!(injector.injections(), 0);
    }

    #[test]
    fn test_renders_once_across_fragments() {
        let calls = Cell::new(0);
        let mut injector = ToolbarInjector::new(ok(&calls));
        injector.inject(&Bytes::from("x</body>"));
        injector.inject(&Bytes::from("y</body>"));
        assert_eq!(calls.get(), 1);
        assert_eq!(injector.injections(), 2);
    }

    #[test]
    fn test_tag_split_across_fragments_is_not_matched() {
        let calls = Cell::new(0);
        let mut injector = ToolbarInjector::new(ok(&calls));
        assert_eq!(injector.inject(&Bytes::from("</bo")), Bytes::from("</bo"));
        assert_eq!(injector.inject(&Bytes::from("dy>")), Bytes::from("dy>"));
        assert_eq!(injector.injections(), 0);
    }

    #[test]
    fn test_render_failure_passes_through() {
        let mut injector = ToolbarInjector::new(|| Err::<String, _>("boom"));
        let out = injector.inject(&Bytes::from("<body></body>"));
        assert_eq!(out, Bytes::from("<body></body>"));
        assert_eq!(injector.injections(), 0);
    }

    #[test]
    fn test_empty_fragment() {
        let calls = Cell::new(0);
        let mut injector = ToolbarInjector::new(ok(&calls));
        assert!(injector.inject(&Bytes::new()).is_empty());
    }
}
