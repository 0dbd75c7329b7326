use crate::error::Result;
use crate::page::Page;
use crate::session::Session;

/// A bounded set of pages for concurrent detail-page visits within a single
/// location's extraction step. Pages are never shared across locations; the
/// pool is created when drill-down starts and closed when it ends.
pub struct PagePool {
    pages: Vec<Page>,
}

impl PagePool {
    /// Open `size` pages in the session. Pages share session cookies, so an
    /// age gate dismissed on the listing page stays dismissed here.
    pub async fn create(session: &Session, size: usize) -> Result<Self> {
        let mut pages = Vec::with_capacity(size);
        for _ in 0..size {
            pages.push(session.create_page().await?);
        }
        Ok(Self { pages })
    }

    pub fn size(&self) -> usize {
        self.pages.len()
    }

    /// The pooled pages. Callers chunk work to `size()` so each page holds at
    /// most one navigation in flight.
    pub fn pages(&self) -> &[Page] {
        &self.pages
    }

    /// Close every page. Idempotent; never fails.
    pub async fn close(&self) {
        for page in &self.pages {
            page.close().await;
        }
    }
}
