use std::collections::BTreeMap;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;
use url::Url;

use super::stream::serve_file;
use super::{ApiError, SharedState};
use crate::domain::{FolderId, FolderView, TagMap};
use crate::library::{
    decode, paginate, resolve_str, ImportSummary, LibraryPage, Page, SortBy, SortOrder,
    TagIndex, VideoAddress, VideoDetails, VideoManifest,
};

type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    success: bool,
}

impl SuccessResponse {
    fn ok() -> Json<Self> {
        Json(Self { success: true })
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct FilesQuery {
    offset: Option<usize>,
    limit: Option<usize>,
    reshuffle: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    offset: Option<usize>,
    limit: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RandomQuery {
    limit: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SearchQuery {
    q: Option<String>,
    offset: Option<usize>,
    limit: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LibraryQuery {
    sort_by: Option<String>,
    order: Option<String>,
    offset: Option<usize>,
    limit: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileNameQuery {
    file_name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateVideoRequest {
    file_name: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    tags: Option<TagMap>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTitleRequest {
    file_name: Option<String>,
    title: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddCategoryRequest {
    category_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AddFolderRequest {
    path: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetActiveRequest {
    #[serde(default)]
    active_ids: Vec<FolderId>,
}

#[derive(Debug, Deserialize)]
pub struct ImportRequest {
    #[serde(default)]
    data: BTreeMap<String, Vec<Value>>,
}

#[derive(Debug, Serialize)]
pub struct FoldersResponse {
    success: bool,
    folders: Vec<FolderView>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestResponse {
    #[serde(flatten)]
    manifest: VideoManifest,

    /// Encoded address, as used in URLs
    name: String,
    video_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    preview_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    thumbnail_url: Option<String>,
}

fn require_file_name(value: Option<String>) -> ApiResult<String> {
    match value {
        Some(name) if !name.trim().is_empty() => Ok(name),
        _ => Err(ApiError::bad_request("Missing fileName")),
    }
}

/// Decode an address from a query or body; malformed ones are unknown videos
fn address_of(file_name: &str) -> ApiResult<VideoAddress> {
    decode(file_name).map_err(|_| ApiError::new(StatusCode::NOT_FOUND, "File not found"))
}

/// URL path for a route prefix and an encoded address
fn media_url(prefix: &str, encoded: &str) -> ApiResult<String> {
    let mut url = Url::parse("http://localhost/")
        .map_err(|e| ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    url.path_segments_mut()
        .map_err(|_| ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "Invalid base URL"))?
        .pop_if_empty()
        .push(prefix)
        .push(encoded);
    Ok(url.path().to_string())
}

pub async fn files(
    State(state): State<SharedState>,
    Query(query): Query<FilesQuery>,
) -> Json<Page<VideoAddress>> {
    let reshuffle = matches!(query.reshuffle.as_deref(), Some("true" | "1"));
    let page = state
        .library
        .catalog
        .files(
            query.offset.unwrap_or(0),
            query.limit.unwrap_or(state.page_size),
            reshuffle,
        )
        .await;
    Json(page)
}

pub async fn all_files(State(state): State<SharedState>) -> Json<Vec<VideoAddress>> {
    Json(state.library.catalog.all_files().await)
}

pub async fn random(
    State(state): State<SharedState>,
    Query(query): Query<RandomQuery>,
) -> Json<Vec<VideoAddress>> {
    Json(state.library.catalog.random(query.limit.unwrap_or(10)).await)
}

pub async fn search(
    State(state): State<SharedState>,
    Query(query): Query<SearchQuery>,
) -> Json<Page<VideoAddress>> {
    let results = state
        .library
        .catalog
        .search(query.q.as_deref().unwrap_or(""))
        .await;
    Json(paginate(
        &results,
        query.offset.unwrap_or(0),
        query.limit.unwrap_or(usize::MAX),
    ))
}

pub async fn by_tag(
    State(state): State<SharedState>,
    Path(tag_name): Path<String>,
    Query(query): Query<PageQuery>,
) -> Json<Page<VideoAddress>> {
    let results = state.library.catalog.by_tag(&tag_name).await;
    Json(paginate(
        &results,
        query.offset.unwrap_or(0),
        query.limit.unwrap_or(usize::MAX),
    ))
}

pub async fn library_files(
    State(state): State<SharedState>,
    Query(query): Query<LibraryQuery>,
) -> ApiResult<Json<LibraryPage>> {
    let sort_by: SortBy = match query.sort_by.as_deref() {
        Some(raw) => raw.parse()?,
        None => SortBy::default(),
    };
    let order: SortOrder = match query.order.as_deref() {
        Some(raw) => raw.parse()?,
        None => SortOrder::default(),
    };

    let page = state
        .library
        .catalog
        .library_listing(
            sort_by,
            order,
            query.offset.unwrap_or(0),
            query.limit.unwrap_or(state.page_size),
        )
        .await;
    Ok(Json(page))
}

/// Which file of a resolved video to stream
#[derive(Debug, Clone, Copy)]
enum MediaKind {
    Video,
    Preview,
    Thumbnail,
}

async fn stream_media(
    state: &SharedState,
    encoded: &str,
    kind: MediaKind,
    method: &Method,
    headers: &HeaderMap,
) -> ApiResult<Response> {
    let resolved = resolve_str(&state.library.registry, encoded).await?;

    let path = match kind {
        MediaKind::Video => Some(resolved.full_path.as_path()),
        MediaKind::Preview => resolved.preview_path.as_deref(),
        MediaKind::Thumbnail => resolved.thumbnail_path.as_deref(),
    }
    .ok_or_else(|| ApiError::new(StatusCode::NOT_FOUND, "File not found"))?;

    debug!("{:?} request for {}", kind, resolved.address);
    Ok(serve_file(path, headers, *method == Method::HEAD).await?)
}

pub async fn stream_video(
    State(state): State<SharedState>,
    Path(encoded): Path<String>,
    method: Method,
    headers: HeaderMap,
) -> ApiResult<Response> {
    stream_media(&state, &encoded, MediaKind::Video, &method, &headers).await
}

pub async fn stream_preview(
    State(state): State<SharedState>,
    Path(encoded): Path<String>,
    method: Method,
    headers: HeaderMap,
) -> ApiResult<Response> {
    stream_media(&state, &encoded, MediaKind::Preview, &method, &headers).await
}

pub async fn stream_thumbnail(
    State(state): State<SharedState>,
    Path(encoded): Path<String>,
    method: Method,
    headers: HeaderMap,
) -> ApiResult<Response> {
    stream_media(&state, &encoded, MediaKind::Thumbnail, &method, &headers).await
}

pub async fn video_manifest(
    State(state): State<SharedState>,
    Query(query): Query<FileNameQuery>,
) -> ApiResult<Json<ManifestResponse>> {
    let file_name = require_file_name(query.file_name)?;
    let address = address_of(&file_name)?;
    let manifest = state.library.catalog.manifest(&address).await?;

    let name = address.encode();
    let video_url = media_url("videos", &name)?;
    let preview_url = if manifest.has_preview {
        Some(media_url("previews", &name)?)
    } else {
        None
    };
    let thumbnail_url = if manifest.has_thumbnail {
        Some(media_url("thumbnails", &name)?)
    } else {
        None
    };

    Ok(Json(ManifestResponse {
        manifest,
        name,
        video_url,
        preview_url,
        thumbnail_url,
    }))
}

pub async fn video_details(
    State(state): State<SharedState>,
    Query(query): Query<FileNameQuery>,
) -> ApiResult<Json<VideoDetails>> {
    let file_name = require_file_name(query.file_name)?;
    let address = address_of(&file_name)?;
    Ok(Json(state.library.hashes.get_details(&address).await?))
}

pub async fn update_video(
    State(state): State<SharedState>,
    Json(body): Json<UpdateVideoRequest>,
) -> ApiResult<Json<SuccessResponse>> {
    let file_name = require_file_name(body.file_name)?;
    let address = address_of(&file_name)?;
    state
        .library
        .hashes
        .upsert_title_and_tags(
            &address,
            body.title.as_deref().unwrap_or(""),
            body.tags.unwrap_or_default(),
        )
        .await?;
    Ok(SuccessResponse::ok())
}

/// Change only the title, keeping the stored tags
pub async fn update_title(
    State(state): State<SharedState>,
    Json(body): Json<UpdateTitleRequest>,
) -> ApiResult<Json<SuccessResponse>> {
    let file_name = require_file_name(body.file_name)?;
    let title = body
        .title
        .ok_or_else(|| ApiError::bad_request("Missing data"))?;
    let address = address_of(&file_name)?;

    state.library.hashes.update_title(&address, &title).await?;
    Ok(SuccessResponse::ok())
}

pub async fn tag_categories(State(state): State<SharedState>) -> Json<TagIndex> {
    Json(state.library.hashes.tag_categories().await)
}

pub async fn add_category(
    State(state): State<SharedState>,
    Json(body): Json<AddCategoryRequest>,
) -> ApiResult<Json<SuccessResponse>> {
    let name = body.category_name.unwrap_or_default();
    state.library.hashes.add_category(&name).await?;
    Ok(SuccessResponse::ok())
}

pub async fn list_folders(State(state): State<SharedState>) -> Json<Vec<FolderView>> {
    Json(state.library.registry.list().await)
}

pub async fn add_folder(
    State(state): State<SharedState>,
    Json(body): Json<AddFolderRequest>,
) -> ApiResult<impl IntoResponse> {
    let view = state
        .library
        .registry
        .register(body.path.as_deref().unwrap_or(""))
        .await?;
    Ok((StatusCode::CREATED, Json(view)))
}

pub async fn set_active_folders(
    State(state): State<SharedState>,
    Json(body): Json<SetActiveRequest>,
) -> ApiResult<Json<FoldersResponse>> {
    let registry = &state.library.registry;
    registry.set_active(&body.active_ids).await?;
    Ok(Json(FoldersResponse {
        success: true,
        folders: registry.list().await,
    }))
}

pub async fn delete_folder(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> ApiResult<Json<SuccessResponse>> {
    state
        .library
        .registry
        .delete(&FolderId::new(id))
        .await?;
    Ok(SuccessResponse::ok())
}

pub async fn import_json(
    State(state): State<SharedState>,
    Json(body): Json<ImportRequest>,
) -> ApiResult<Json<ImportSummary>> {
    if body.data.is_empty() {
        return Err(ApiError::bad_request("No catalog data provided"));
    }
    Ok(Json(
        state.library.registry.import_json_catalog(body.data).await?,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_media_url_escapes_segment() {
        assert_eq!(
            media_url("videos", "f0::my clip#1.mp4").unwrap(),
            "/videos/f0::my%20clip%231.mp4"
        );
        assert_eq!(
            media_url("thumbnails", "f2::a/b.jpg").unwrap(),
            "/thumbnails/f2::a%2Fb.jpg"
        );
    }

    #[test]
    fn test_require_file_name() {
        assert!(require_file_name(None).is_err());
        assert!(require_file_name(Some("  ".to_string())).is_err());
        assert_eq!(require_file_name(Some("f0::a.mp4".to_string())).unwrap(), "f0::a.mp4");
    }

    #[test]
    fn test_address_of_rejects_malformed() {
        assert_eq!(address_of("no-delimiter").unwrap_err().status, StatusCode::NOT_FOUND);
        let address = address_of("f1::x::y.mp4").unwrap();
        assert_eq!(address.folder_id.as_str(), "f1");
        assert_eq!(address.file_name, "x::y.mp4");
    }
}
