use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShotDefinition {
    pub id: &'static str,
    pub label_cn: &'static str,
    pub label_en: &'static str,
    pub value_cn: &'static str,
    pub value_en: &'static str,
}

impl ShotDefinition {
    pub const fn label(&self, language: Language) -> &'static str {
        match language {
            Language::Cn => self.label_cn,
            Language::En => self.label_en,
        }
    }

    pub const fn value(&self, language: Language) -> &'static str {
        match language {
            Language::Cn => self.value_cn,
            Language::En => self.value_en,
        }
    }
}

pub const SHOT_TYPES: [ShotDefinition; 12] = [
    ShotDefinition {
        id: "medium",
        label_cn: "中景",
        label_en: "Medium Shot",
        value_cn: "中景镜头，展示人物上半身",
        value_en: "Medium Shot, showing upper body",
    },
    ShotDefinition {
        id: "close_up",
        label_cn: "特写",
        label_en: "Close-up",
        value_cn: "面部特写，展示细节表情",
        value_en: "Close-up shot, revealing facial details",
    },
    ShotDefinition {
        id: "extreme_close_up",
        label_cn: "大特写",
        label_en: "Extreme Close-up",
        value_cn: "大特写，眼部或微小细节",
        value_en: "Extreme Close-up, focusing on eyes or macro details",
    },
    ShotDefinition {
        id: "wide",
        label_cn: "全景",
        label_en: "Wide Shot",
        value_cn: "全景镜头，展示人物与环境",
        value_en: "Wide Shot, showing character within environment",
    },
    ShotDefinition {
        id: "extreme_wide",
        label_cn: "大远景",
        label_en: "Extreme Wide",
        value_cn: "极远全景，强调宏大场景",
        value_en: "Extreme Wide Shot, emphasizing vast landscape",
    },
    ShotDefinition {
        id: "low_angle",
        label_cn: "低角度",
        label_en: "Low Angle",
        value_cn: "低角度仰拍，展现威严感",
        value_en: "Low Angle shot, looking up",
    },
    ShotDefinition {
        id: "high_angle",
        label_cn: "高角度",
        label_en: "High Angle",
        value_cn: "高角度俯视",
        value_en: "High Angle shot, looking down",
    },
    ShotDefinition {
        id: "overhead",
        label_cn: "上帝视角",
        label_en: "Overhead",
        value_cn: "正上方垂直俯视",
        value_en: "Direct Overhead bird's-eye view",
    },
    ShotDefinition {
        id: "back",
        label_cn: "背面",
        label_en: "Back View",
        value_cn: "人物背面视角",
        value_en: "View from behind the character",
    },
    ShotDefinition {
        id: "ots",
        label_cn: "过肩",
        label_en: "OTS",
        value_cn: "过肩镜头",
        value_en: "Over-the-shoulder shot",
    },
    ShotDefinition {
        id: "dutch",
        label_cn: "荷兰角",
        label_en: "Dutch Angle",
        value_cn: "荷兰角倾斜构图",
        value_en: "Dutch Angle, tilted composition",
    },
    ShotDefinition {
        id: "action",
        label_cn: "动态",
        label_en: "Action",
        value_cn: "动态模糊动作捕捉",
        value_en: "Action shot with motion blur",
    },
];

pub const DEFAULT_SHOT_ID: &str = "medium";

pub fn find_shot(id: &str) -> Option<&'static ShotDefinition> {
    SHOT_TYPES.iter().find(|shot| shot.id == id)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Language {
    #[default]
    Cn,
    En,
}

impl Language {
    pub const fn as_str(self) -> &'static str {
        match self {
            Language::Cn => "CN",
            Language::En => "EN",
        }
    }

    pub const fn template(self) -> &'static PromptTemplate {
        match self {
            Language::Cn => &TEMPLATE_CN,
            Language::En => &TEMPLATE_EN,
        }
    }

    pub const fn scene_placeholder(self) -> &'static str {
        match self {
            Language::Cn => "[场景描述]",
            Language::En => "[Scene Description]",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unsupported language '{0}' (expected CN or EN)")]
pub struct ParseLanguageError(pub String);

impl FromStr for Language {
    type Err = ParseLanguageError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "cn" | "zh" | "zh-cn" | "chinese" => Ok(Language::Cn),
            "en" | "english" => Ok(Language::En),
            _ => Err(ParseLanguageError(value.trim().to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PromptTemplate {
    pub prefix: &'static str,
    pub suffix: &'static str,
    pub shot_prefix: &'static str,
}

pub const TEMPLATE_CN: PromptTemplate = PromptTemplate {
    prefix: "根据",
    suffix: "，生成一张具有凝聚力的[3X3]网格图像，包含在统一环境中的9个不同摄像机镜头，严格保持人物/物体、服装和光线的一致性，8K分辨率，超逼真细节和质感。",
    shot_prefix: "镜头",
};

pub const TEMPLATE_EN: PromptTemplate = PromptTemplate {
    prefix: "Based on ",
    suffix: ", generate a cohesive [3x3] grid image containing 9 different camera shots in a unified environment, strictly maintaining consistency of character/objects, clothing, and lighting, 8K resolution, hyper-realistic details and texture.",
    shot_prefix: "Shot ",
};
