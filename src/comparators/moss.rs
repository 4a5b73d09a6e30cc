//! Client for the hosted MOSS service.
//!
//! The service speaks a line protocol over plain TCP: a handful of option
//! lines, a language acknowledgement, one `file` header per upload followed by
//! the raw bytes, then `query` which answers with the report URL.

use async_trait::async_trait;
use std::path::Path;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;

use super::traits::{CompareError, CompareOptions, Comparator, ComparisonInput};

pub struct MossClient {
    user_id: String,
    server: String,
}

impl MossClient {
    pub fn new(user_id: &str, server: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            server: server.to_string(),
        }
    }

    /// Run one submission over an already connected stream.
    pub async fn submit<S>(
        &self,
        stream: &mut S,
        input: &ComparisonInput,
        options: &CompareOptions,
    ) -> Result<String, CompareError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let header = format!(
            "moss {}\ndirectory {}\nX {}\nmaxmatches {}\nshow {}\nlanguage {}\n",
            self.user_id,
            options.directory_mode as u8,
            options.experimental as u8,
            options.ignore_limit,
            options.max_matches_shown,
            options.language,
        );
        stream.write_all(header.as_bytes()).await?;
        stream.flush().await?;

        let ack = read_reply(stream).await?;
        if ack.trim() == "no" {
            stream.write_all(b"end\n").await?;
            return Err(CompareError::LanguageRejected(options.language.clone()));
        }
        tracing::debug!(ack = %ack.trim(), "language accepted");

        for path in &input.baseline {
            upload(stream, path, &input.display_name(path), 0, &options.language).await?;
        }
        for (index, path) in input.candidates.iter().enumerate() {
            upload(
                stream,
                path,
                &input.display_name(path),
                index + 1,
                &options.language,
            )
            .await?;
        }

        stream
            .write_all(format!("query 0 {}\n", options.comment).as_bytes())
            .await?;
        stream.flush().await?;

        let reply = read_reply(stream).await?;
        stream.write_all(b"end\n").await?;
        stream.flush().await?;

        let url = reply.replace('\n', "").trim().to_string();
        if !url.starts_with("http") {
            return Err(CompareError::NoReportUrl(url));
        }
        Ok(url)
    }
}

async fn upload<S>(
    stream: &mut S,
    path: &Path,
    display_name: &str,
    file_id: usize,
    language: &str,
) -> Result<(), CompareError>
where
    S: AsyncWrite + Unpin,
{
    let content = tokio::fs::read(path).await?;
    tracing::debug!(file = %display_name, id = file_id, bytes = content.len(), "uploading");
    let header = format!(
        "file {} {} {} {}\n",
        file_id,
        language,
        content.len(),
        display_name
    );
    stream.write_all(header.as_bytes()).await?;
    stream.write_all(&content).await?;
    Ok(())
}

/// Read one server reply: up to a newline, EOF, or 1 KiB.
async fn read_reply<S>(stream: &mut S) -> Result<String, CompareError>
where
    S: AsyncRead + Unpin,
{
    let mut reply = Vec::new();
    let mut buf = [0u8; 1024];
    loop {
        let n = stream.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        reply.extend_from_slice(&buf[..n]);
        if reply.contains(&b'\n') || reply.len() >= 1024 {
            break;
        }
    }
    Ok(String::from_utf8_lossy(&reply).into_owned())
}

#[async_trait]
impl Comparator for MossClient {
    fn name(&self) -> &'static str {
        "MOSS service"
    }

    async fn compare(
        &self,
        input: &ComparisonInput,
        options: &CompareOptions,
    ) -> Result<String, CompareError> {
        if input.candidates.is_empty() {
            return Err(CompareError::NoCandidates);
        }
        tracing::info!(
            server = %self.server,
            baseline = input.baseline.len(),
            candidates = input.candidates.len(),
            "submitting to MOSS"
        );
        let mut stream = TcpStream::connect(&self.server).await?;
        self.submit(&mut stream, input, options).await
    }
}
