/*!
# sheetgate

A small web application that turns uploaded Excel workbooks into tabular
data and hands it back as CSV.

## Overview

A user signs in, uploads an `.xlsx` file and gets the rows of its first
worksheet back as JSON. The same rows can then be downloaded as a CSV
attachment. Instead of converting locally, the upload can also be relayed
to an external HTTP API, in which case the JSON that API returns becomes
the dataset.

## Architecture

### Web Layer
- **Technologies**: Rust, axum, tokio
- **Key Components**:
  - Session Gate - server-side sessions keyed by a cookie, login-required middleware
  - Upload Handler - multipart upload, extension check, conversion
  - Forwarding Handler - relays uploads to the external API with a bounded timeout
  - Download Handler - renders the current dataset as a CSV attachment

### Conversion Layer
- Workbook decoding with calamine (first worksheet, header row, typed cells)
- CSV rendering with the csv crate

### Data Persistence Layer
- One JSON file per session holding the latest dataset, with expiry
- Optional users file of Argon2 password hashes

## Modules

- **loader**: xlsx bytes to row records, JSON to row records
- **downloader**: row records to CSV
- **saving**: per-session dataset store
- **users**: pluggable credential verification (accept-all or Argon2 users file)
- **login**: sessions, login/logout handlers and the login gate
- **forward**: client for the external API
- **app**: routing and request handlers
- **config**: environment configuration
- **error**: error kinds and their HTTP mapping

## REST API Endpoints

- `GET /`, `POST /` - Login page and login
- `GET /dashboard` - Landing page (login required)
- `POST /process-file` - Upload a spreadsheet, returns `{"output": [...]}`
- `POST /process-files` - Forward file(s) to the external API
- `GET /download-csv` - Current dataset as CSV
- `POST /logout` - End the session
*/

pub mod config;
pub mod downloader;
pub mod error;
pub mod loader;
pub mod saving;

#[cfg(feature = "web")]
pub mod app;
#[cfg(feature = "web")]
pub mod forward;
#[cfg(feature = "web")]
pub mod login;
#[cfg(feature = "web")]
pub mod users;

pub use config::Config;
pub use downloader::render_csv;
pub use error::AppError;
pub use loader::{RowRecord, parse, rows_from_json};
pub use saving::DatasetStore;
