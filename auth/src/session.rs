//! Session manager.
//!
//! Creates, rotates, and invalidates sessions and their refresh-token
//! trees. The refresh state machine tolerates a 10-second reuse window for
//! clients that lost a successful response; any later reuse of a rotated
//! token is treated as compromise and kills the whole session.

use crate::error::Result;
use crate::state::{RefreshTokenId, SessionId, TokenPair, UserId};
use crate::store::records::{RefreshToken, Session};
use crate::store::AuthStore;
use crate::tokens::TokenCodec;
use crate::Auth;
use chrono::Utc;

/// Options for [`Auth::issue_tokens`].
#[derive(Debug, Clone, Copy, Default)]
pub struct IssueTokenOptions {
    /// Parent for the newly minted refresh token.
    pub parent_refresh_token_id: Option<RefreshTokenId>,

    /// Re-emit this existing refresh token instead of minting one.
    pub issued_refresh_token_id: Option<RefreshTokenId>,
}

impl<S: AuthStore> Auth<S> {
    /// Resolve the session a successful sign-in should use: the existing one
    /// when still live, a fresh one otherwise.
    ///
    /// # Errors
    ///
    /// Returns storage errors verbatim.
    pub async fn sign_in_session(
        &self,
        user_id: UserId,
        existing_session_id: Option<SessionId>,
    ) -> Result<Session> {
        let now = Utc::now();
        if let Some(session_id) = existing_session_id {
            if let Some(session) = self.store.session(session_id).await? {
                if session.user_id == user_id && session.expiration_time > now {
                    return Ok(session);
                }
            }
        }
        let session = Session {
            id: SessionId::new(),
            user_id,
            expiration_time: now + self.config.session.total_duration,
            created_at: now,
        };
        self.store.insert_session(session.clone()).await?;
        tracing::debug!(user_id = %user_id, session_id = %session.id, "session created");
        Ok(session)
    }

    /// Sign an access token and mint (or re-emit) the refresh token.
    ///
    /// # Errors
    ///
    /// Returns `INTERNAL_ERROR` if the session row is gone mid-flow.
    pub async fn issue_tokens(
        &self,
        user_id: UserId,
        session_id: SessionId,
        options: IssueTokenOptions,
    ) -> Result<TokenPair> {
        let now = Utc::now();
        let access_token = self.codec.sign_access_token(user_id, session_id, now)?;

        let refresh_token_id = if let Some(reissued) = options.issued_refresh_token_id {
            reissued
        } else {
            let session = self
                .store
                .session(session_id)
                .await?
                .ok_or_else(|| crate::AuthError::Internal("session vanished mid-issue".into()))?;
            let token = RefreshToken {
                id: RefreshTokenId::new(),
                session_id,
                expiration_time: session.expiration_time,
                first_used_time: None,
                parent_id: options.parent_refresh_token_id,
                created_at: now,
            };
            let id = token.id;
            self.store.insert_refresh_token(token).await?;
            id
        };

        Ok(TokenPair {
            access_token,
            refresh_token: TokenCodec::format_refresh_token(refresh_token_id, session_id),
        })
    }

    /// Rotate a refresh token.
    ///
    /// Returns `None` for anything that should end in re-authentication:
    /// malformed tokens, dead sessions, and theft detection.
    ///
    /// # Errors
    ///
    /// Returns storage errors verbatim.
    pub async fn refresh(&self, refresh_token: &str) -> Result<Option<TokenPair>> {
        let Ok((token_id, session_id)) = TokenCodec::parse_refresh_token(refresh_token) else {
            return Ok(None);
        };
        let now = Utc::now();

        let row = self.store.refresh_token(token_id).await?;
        let session = self.store.session(session_id).await?;
        let (row, session) = match (row, session) {
            (Some(row), Some(session))
                if row.session_id == session_id
                    && row.expiration_time > now
                    && session.expiration_time > now =>
            {
                (row, session)
            }
            (_, session) => {
                // Stray rows for a dead session are swept on sight.
                self.store.delete_refresh_tokens(session_id).await?;
                if let Some(session) = session {
                    if session.expiration_time <= now {
                        self.store.delete_session(session.id).await?;
                    }
                }
                return Ok(None);
            }
        };

        let Some(first_used) = row.first_used_time else {
            // First use: mark and rotate.
            let mut used = row;
            used.first_used_time = Some(now);
            self.store.update_refresh_token(used).await?;
            let tokens = self
                .issue_tokens(
                    session.user_id,
                    session_id,
                    IssueTokenOptions {
                        parent_refresh_token_id: Some(token_id),
                        issued_refresh_token_id: None,
                    },
                )
                .await?;
            return Ok(Some(tokens));
        };

        // Used before. An unused child means the rotation result was lost in
        // transit: re-emit it idempotently.
        let children = self
            .store
            .refresh_token_children(session_id, Some(token_id))
            .await?;
        if let Some(active) = children.iter().find(|c| c.first_used_time.is_none()) {
            let tokens = self
                .issue_tokens(
                    session.user_id,
                    session_id,
                    IssueTokenOptions {
                        parent_refresh_token_id: None,
                        issued_refresh_token_id: Some(active.id),
                    },
                )
                .await?;
            return Ok(Some(tokens));
        }

        if now - first_used <= crate::constants::refresh_reuse_window() {
            // The child was already rotated away but we are still inside the
            // retry window: mint a sibling under the same parent.
            let tokens = self
                .issue_tokens(
                    session.user_id,
                    session_id,
                    IssueTokenOptions {
                        parent_refresh_token_id: Some(token_id),
                        issued_refresh_token_id: None,
                    },
                )
                .await?;
            return Ok(Some(tokens));
        }

        // Reuse outside the window: the chain is compromised. Kill the
        // session and every refresh token in it.
        tracing::error!(
            session_id = %session_id,
            refresh_token_id = %token_id,
            first_used = %first_used,
            "refresh token reuse outside the retry window, invalidating session"
        );
        self.store.delete_refresh_tokens(session_id).await?;
        self.store.delete_session(session_id).await?;
        Ok(None)
    }

    /// Delete a session and its refresh tokens. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns storage errors verbatim.
    pub async fn sign_out(&self, session_id: SessionId) -> Result<()> {
        self.store.delete_refresh_tokens(session_id).await?;
        self.store.delete_session(session_id).await?;
        tracing::debug!(session_id = %session_id, "session deleted");
        Ok(())
    }

    /// Delete every session a user owns, skipping ids in `except`.
    ///
    /// # Errors
    ///
    /// Returns storage errors verbatim.
    pub async fn invalidate_sessions(
        &self,
        user_id: UserId,
        except: &[SessionId],
    ) -> Result<()> {
        for session in self.store.sessions_by_user(user_id).await? {
            if except.contains(&session.id) {
                continue;
            }
            self.sign_out(session.id).await?;
        }
        Ok(())
    }

    /// Enumerate a user's sessions.
    ///
    /// # Errors
    ///
    /// Returns storage errors verbatim.
    pub async fn list_sessions(&self, user_id: UserId) -> Result<Vec<Session>> {
        self.store.sessions_by_user(user_id).await
    }
}
