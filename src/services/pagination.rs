use std::future::Future;

use color_eyre::eyre::Result;

use crate::ports::catalog::PageRequest;
use crate::services::pacing::Pacer;

/// Collect every item from a paginated endpoint.
///
/// Pages are requested one at a time, each after the pacer allows it. The
/// loop continues while a page comes back full and stops on the first short
/// page, so the total count never needs to be known up front. `cursor_of`
/// extracts the id used as the `after` cursor for the next request.
pub async fn fetch_all<T, F, Fut, K>(
    pacer: &Pacer,
    page_size: u32,
    mut fetch_page: F,
    cursor_of: K,
) -> Result<Vec<T>>
where
    F: FnMut(PageRequest) -> Fut,
    Fut: Future<Output = Result<Vec<T>>>,
    K: Fn(&T) -> String,
{
    let page_size = page_size.max(1);
    let mut items = Vec::new();
    let mut request = PageRequest::first(page_size);

    loop {
        pacer.wait().await;
        let page = fetch_page(request.clone()).await?;
        let count = page.len();
        let next_after = page.last().map(&cursor_of);
        items.extend(page);

        log::debug!(
            "Fetched page at offset {} ({} items, {} total)",
            request.offset,
            count,
            items.len()
        );

        if count < page_size as usize {
            break;
        }

        request.offset += page_size;
        request.after = next_after;
    }

    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use color_eyre::eyre::eyre;
    use std::sync::Mutex;

    fn numbers(count: usize) -> Vec<String> {
        (0..count).map(|i| format!("id{i}")).collect()
    }

    async fn page_of(source: &[String], request: &PageRequest) -> Result<Vec<String>> {
        let start = (request.offset as usize).min(source.len());
        let end = (start + request.limit as usize).min(source.len());
        Ok(source[start..end].to_vec())
    }

    #[tokio::test]
    async fn test_stops_on_short_page() {
        let source = numbers(7);
        let requests = Mutex::new(Vec::new());

        let items = fetch_all(
            &Pacer::disabled(),
            3,
            |request| {
                requests.lock().unwrap().push(request.clone());
                let source = &source;
                async move { page_of(source, &request).await }
            },
            |id: &String| id.clone(),
        )
        .await
        .unwrap();

        assert_eq!(items, source);
        let requests = requests.into_inner().unwrap();
        assert_eq!(requests.len(), 3);
        assert_eq!(requests[1].offset, 3);
        assert_eq!(requests[2].after.as_deref(), Some("id5"));
    }

    #[tokio::test]
    async fn test_exact_multiple_fetches_one_empty_page() {
        let source = numbers(4);
        let calls = Mutex::new(0);

        let items = fetch_all(
            &Pacer::disabled(),
            2,
            |request| {
                *calls.lock().unwrap() += 1;
                let source = &source;
                async move { page_of(source, &request).await }
            },
            |id: &String| id.clone(),
        )
        .await
        .unwrap();

        assert_eq!(items.len(), 4);
        assert_eq!(*calls.lock().unwrap(), 3);
    }

    #[tokio::test]
    async fn test_error_propagates() {
        let result: Result<Vec<String>> = fetch_all(
            &Pacer::disabled(),
            2,
            |_| async { Err(eyre!("boom")) },
            |id: &String| id.clone(),
        )
        .await;

        assert!(result.is_err());
    }
}
