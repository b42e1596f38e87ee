use std::fs;
use std::path::Path;

use thiserror::Error;
use takeoff_core::{
    document::{
        Arc, BlockDefinition, BlockReference, Drawing, DrawingUnits, EdgeKind, Entity, Hatch,
        HatchEdge, HatchLoop, LegacyPolyline, Line, Polyline, PolylineVertex,
    },
    geometry::{Point2, Vector2},
};

const BINARY_SENTINEL: &[u8] = b"AutoCAD Binary DXF";

#[derive(Debug, Error)]
pub enum IoError {
    #[error("unsupported feature: {0}")]
    UnsupportedFeature(String),
    #[error("failed to read file {path:?}: {source}")]
    ReadError {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid document structure: {0}")]
    InvalidDocument(String),
}

pub trait DrawingLoader {
    fn load(&self, path: &Path) -> Result<Drawing, IoError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct DxfFacade;

impl DxfFacade {
    pub fn new() -> Self {
        Self
    }

    /// 解析已在内存中的 ASCII DXF 文本。
    pub fn parse_str(&self, source: &str) -> Result<Drawing, IoError> {
        if source.as_bytes().starts_with(BINARY_SENTINEL) {
            return Err(IoError::UnsupportedFeature(
                "binary DXF is not supported".to_string(),
            ));
        }
        DxfParser::new(source).parse().map_err(|err| match err {
            DxfError::Unsupported { feature } => IoError::UnsupportedFeature(feature),
            DxfError::Invalid { message } | DxfError::Malformed { message } => {
                IoError::InvalidDocument(message)
            }
        })
    }
}

impl DrawingLoader for DxfFacade {
    fn load(&self, path: &Path) -> Result<Drawing, IoError> {
        let bytes = fs::read(path).map_err(|source| IoError::ReadError {
            path: path.to_path_buf(),
            source,
        })?;
        if bytes.starts_with(BINARY_SENTINEL) {
            return Err(IoError::UnsupportedFeature(format!(
                "binary DXF is not supported ({})",
                path.display()
            )));
        }
        // 旧版 DXF 常用本地代码页，非 UTF-8 字节按替换字符处理
        let data = String::from_utf8_lossy(&bytes);
        self.parse_str(&data)
    }
}

#[derive(Debug)]
enum DxfError {
    /// 实体类型或模式不受支持，跳过并计数。
    Unsupported { feature: String },
    /// 单个实体内容无效，跳过并记录。
    Invalid { message: String },
    /// 文件结构损坏，无法继续读取。
    Malformed { message: String },
}

impl DxfError {
    fn unsupported(feature: impl Into<String>) -> Self {
        Self::Unsupported {
            feature: feature.into(),
        }
    }

    fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }

    fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed {
            message: message.into(),
        }
    }
}

struct DxfParser<'a> {
    reader: DxfReader<'a>,
}

impl<'a> DxfParser<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            reader: DxfReader::new(source),
        }
    }

    fn parse(mut self) -> Result<Drawing, DxfError> {
        let mut drawing = Drawing::new();
        while let Some((code, value)) = self.reader.next_pair()? {
            if code != 0 {
                return Err(DxfError::malformed(format!(
                    "意外的组码 {code}（期望 0 表示 SECTION/EOF）"
                )));
            }
            match value.trim() {
                "SECTION" => {
                    let (name_code, name) = self
                        .reader
                        .next_pair()?
                        .ok_or_else(|| DxfError::malformed("SECTION 缺少名称（组码 2）"))?;
                    if name_code != 2 {
                        return Err(DxfError::malformed(format!(
                            "SECTION 名称使用了组码 {name_code}（期望 2）"
                        )));
                    }
                    match name.trim() {
                        "HEADER" => self.parse_header(&mut drawing)?,
                        "ENTITIES" => self.parse_entities(&mut drawing)?,
                        "BLOCKS" => self.parse_blocks(&mut drawing)?,
                        _ => self.skip_section()?,
                    }
                }
                "EOF" => break,
                unexpected => {
                    return Err(DxfError::malformed(format!(
                        "意外的标记 {unexpected}，期望 SECTION 或 EOF"
                    )));
                }
            }
        }
        Ok(drawing)
    }

    fn skip_section(&mut self) -> Result<(), DxfError> {
        loop {
            match self.reader.next_pair()? {
                Some((0, value)) if value.trim() == "ENDSEC" => break,
                Some(_) => continue,
                None => {
                    return Err(DxfError::malformed("SECTION 未找到 ENDSEC 终止标记"));
                }
            }
        }
        Ok(())
    }

    fn parse_header(&mut self, drawing: &mut Drawing) -> Result<(), DxfError> {
        let mut variable: Option<String> = None;
        loop {
            match self.reader.next_pair()? {
                Some((0, value)) if value.trim() == "ENDSEC" => break,
                Some((9, name)) => variable = Some(name.trim().to_string()),
                Some((70, value)) if variable.as_deref() == Some("$INSUNITS") => {
                    let code = parse_i16(&value, "HEADER $INSUNITS（组码 70）")
                        .map_err(|err| DxfError::malformed(err.message()))?;
                    drawing.set_units(DrawingUnits::from_insunits(code));
                }
                Some(_) => {}
                None => return Err(DxfError::malformed("HEADER 段未找到 ENDSEC 终止标记")),
            }
        }
        Ok(())
    }

    fn parse_entities(&mut self, drawing: &mut Drawing) -> Result<(), DxfError> {
        loop {
            let (code, value) = match self.reader.next_pair()? {
                Some(pair) => pair,
                None => return Err(DxfError::malformed("ENTITIES 段提前结束")),
            };
            if code != 0 {
                return Err(DxfError::malformed(format!(
                    "ENTITIES 段遇到组码 {code}（期望 0 表示实体起始）"
                )));
            }

            match value.trim() {
                "ENDSEC" => break,
                "SEQEND" => self.skip_entity_body()?,
                kind => {
                    if let Some(entity) = self.read_entity(kind, drawing)? {
                        drawing.add_entity(entity);
                    }
                }
            }
        }
        Ok(())
    }

    fn parse_blocks(&mut self, drawing: &mut Drawing) -> Result<(), DxfError> {
        loop {
            let (code, value) = match self.reader.next_pair()? {
                Some(pair) => pair,
                None => return Err(DxfError::malformed("BLOCKS 段提前结束")),
            };
            if code != 0 {
                return Err(DxfError::malformed(format!(
                    "BLOCKS 段遇到组码 {code}（期望 0 表示块起始）"
                )));
            }

            match value.trim() {
                "ENDSEC" => break,
                "BLOCK" => {
                    if let Some(definition) = self.parse_block_definition(drawing)? {
                        drawing.add_block_definition(definition);
                    }
                }
                _ => {
                    self.skip_entity_body()?;
                }
            }
        }
        Ok(())
    }

    fn parse_block_definition(
        &mut self,
        drawing: &mut Drawing,
    ) -> Result<Option<BlockDefinition>, DxfError> {
        let mut name: Option<String> = None;
        let mut base_x: f64 = 0.0;
        let mut base_y: f64 = 0.0;
        let mut entities: Vec<Entity> = Vec::new();

        loop {
            match self.reader.next_pair()? {
                Some((0, value)) => match value.trim() {
                    "ENDBLK" => {
                        self.skip_entity_body()?;
                        break;
                    }
                    "SEQEND" => self.skip_entity_body()?,
                    kind => {
                        if let Some(entity) = self.read_entity(kind, drawing)? {
                            entities.push(entity);
                        }
                    }
                },
                Some((code, value)) => match code {
                    2 => name = Some(value.trim().to_string()),
                    10 => {
                        base_x = parse_f64(&value, "BLOCK 基点 X")
                            .map_err(|err| DxfError::malformed(err.message()))?
                    }
                    20 => {
                        base_y = parse_f64(&value, "BLOCK 基点 Y")
                            .map_err(|err| DxfError::malformed(err.message()))?
                    }
                    _ => {}
                },
                None => {
                    return Err(DxfError::malformed("BLOCK 定义未找到 ENDBLK 终止标记"));
                }
            }
        }

        let name = name.ok_or_else(|| DxfError::malformed("BLOCK 缺少名称（组码 2）"))?;

        // 模型空间/图纸空间是布局容器，不作为可插入的块
        let upper = name.to_uppercase();
        if upper.starts_with("*MODEL_SPACE") || upper.starts_with("*PAPER_SPACE") {
            return Ok(None);
        }

        Ok(Some(BlockDefinition {
            name,
            base_point: Point2::new(base_x, base_y),
            entities,
        }))
    }

    /// 读取单个实体；不支持的类型计数跳过，内容无效的实体记录后跳过。
    fn read_entity(
        &mut self,
        kind: &str,
        drawing: &mut Drawing,
    ) -> Result<Option<Entity>, DxfError> {
        match self.parse_entity(kind) {
            Ok(entity) => Ok(Some(entity)),
            Err(DxfError::Unsupported { feature }) => {
                self.skip_entity_body()?;
                drawing.note_unsupported(feature);
                Ok(None)
            }
            Err(DxfError::Invalid { message }) => {
                self.skip_entity_body()?;
                drawing.note_rejected(kind, message);
                Ok(None)
            }
            Err(err @ DxfError::Malformed { .. }) => Err(err),
        }
    }

    fn parse_entity(&mut self, kind: &str) -> Result<Entity, DxfError> {
        match kind {
            "LINE" => self.parse_line(),
            "ARC" => self.parse_arc(),
            "LWPOLYLINE" => self.parse_lwpolyline(),
            "POLYLINE" => self.parse_legacy_polyline(),
            "HATCH" => self.parse_hatch(),
            "INSERT" => self.parse_insert(),
            other => Err(DxfError::unsupported(other)),
        }
    }

    fn parse_line(&mut self) -> Result<Entity, DxfError> {
        let mut layer = None;
        let mut start_x = None;
        let mut start_y = None;
        let mut end_x = None;
        let mut end_y = None;
        loop {
            match self.reader.next_pair()? {
                Some((0, value)) => {
                    self.reader.put_back((0, value));
                    break;
                }
                Some((code, value)) => match code {
                    8 => layer = Some(value.trim().to_string()),
                    10 => assign_coord(&mut start_x, &value, "LINE 起点 X（组码 10）")?,
                    20 => assign_coord(&mut start_y, &value, "LINE 起点 Y（组码 20）")?,
                    11 => assign_coord(&mut end_x, &value, "LINE 终点 X（组码 11）")?,
                    21 => assign_coord(&mut end_y, &value, "LINE 终点 Y（组码 21）")?,
                    _ => {} // 忽略 Z 坐标及样式字段
                },
                None => return Err(DxfError::malformed("LINE 未正确结束")),
            }
        }

        let layer = layer.unwrap_or_else(|| "0".to_string());
        let sx = start_x.ok_or_else(|| DxfError::invalid("LINE 缺少起点 X（组码 10）"))?;
        let sy = start_y.ok_or_else(|| DxfError::invalid("LINE 缺少起点 Y（组码 20）"))?;
        let ex = end_x.ok_or_else(|| DxfError::invalid("LINE 缺少终点 X（组码 11）"))?;
        let ey = end_y.ok_or_else(|| DxfError::invalid("LINE 缺少终点 Y（组码 21）"))?;

        Ok(Entity::Line(Line {
            start: Point2::new(sx, sy),
            end: Point2::new(ex, ey),
            layer,
        }))
    }

    fn parse_arc(&mut self) -> Result<Entity, DxfError> {
        let mut layer = None;
        let mut center_x = None;
        let mut center_y = None;
        let mut radius = None;
        let mut start_angle = None;
        let mut end_angle = None;
        loop {
            match self.reader.next_pair()? {
                Some((0, value)) => {
                    self.reader.put_back((0, value));
                    break;
                }
                Some((code, value)) => match code {
                    8 => layer = Some(value.trim().to_string()),
                    10 => assign_coord(&mut center_x, &value, "ARC 圆心 X（组码 10）")?,
                    20 => assign_coord(&mut center_y, &value, "ARC 圆心 Y（组码 20）")?,
                    40 => assign_coord(&mut radius, &value, "ARC 半径（组码 40）")?,
                    50 => assign_coord(&mut start_angle, &value, "ARC 起始角（组码 50）")?,
                    51 => assign_coord(&mut end_angle, &value, "ARC 终止角（组码 51）")?,
                    _ => {}
                },
                None => return Err(DxfError::malformed("ARC 未正确结束")),
            }
        }

        let layer = layer.unwrap_or_else(|| "0".to_string());
        let cx = center_x.ok_or_else(|| DxfError::invalid("ARC 缺少圆心 X（组码 10）"))?;
        let cy = center_y.ok_or_else(|| DxfError::invalid("ARC 缺少圆心 Y（组码 20）"))?;
        let radius = radius.ok_or_else(|| DxfError::invalid("ARC 缺少半径（组码 40）"))?;
        let start_angle =
            start_angle.ok_or_else(|| DxfError::invalid("ARC 缺少起始角（组码 50）"))?;
        let end_angle = end_angle.ok_or_else(|| DxfError::invalid("ARC 缺少终止角（组码 51）"))?;

        Ok(Entity::Arc(Arc {
            center: Point2::new(cx, cy),
            radius,
            start_angle: start_angle.to_radians(),
            end_angle: end_angle.to_radians(),
            layer,
        }))
    }

    fn parse_lwpolyline(&mut self) -> Result<Entity, DxfError> {
        let mut layer = None;
        let mut is_closed = false;
        let mut vertices: Vec<PolylineVertex> = Vec::new();
        let mut pending_x: Option<f64> = None;
        loop {
            match self.reader.next_pair()? {
                Some((0, value)) => {
                    self.reader.put_back((0, value));
                    break;
                }
                Some((code, value)) => match code {
                    8 => layer = Some(value.trim().to_string()),
                    70 => {
                        let flag = parse_i32(&value, "LWPOLYLINE 标志")?;
                        is_closed = flag & 0x01 == 0x01;
                    }
                    10 => assign_coord(&mut pending_x, &value, "LWPOLYLINE 顶点 X（组码 10）")?,
                    20 => {
                        let y = parse_f64(&value, "LWPOLYLINE 顶点 Y")?;
                        let x = pending_x.take().ok_or_else(|| {
                            DxfError::invalid("LWPOLYLINE 顶点 Y 前缺少对应的 X（组码 10）")
                        })?;
                        vertices.push(PolylineVertex::new(Point2::new(x, y)));
                    }
                    42 => {
                        let bulge = parse_f64(&value, "LWPOLYLINE 顶点 bulge")?;
                        let vertex = vertices.last_mut().ok_or_else(|| {
                            DxfError::invalid("LWPOLYLINE 在定义首个顶点前遇到 bulge（组码 42）")
                        })?;
                        vertex.bulge = bulge;
                    }
                    _ => {}
                },
                None => return Err(DxfError::malformed("LWPOLYLINE 未正确结束")),
            }
        }

        if pending_x.is_some() {
            return Err(DxfError::invalid(
                "LWPOLYLINE 顶点坐标成对出现（组码 10/20），检测到不完整的顶点",
            ));
        }

        if vertices.is_empty() {
            return Err(DxfError::invalid("LWPOLYLINE 未解析到任何顶点"));
        }

        let layer = layer.unwrap_or_else(|| "0".to_string());
        Ok(Entity::Polyline(Polyline {
            vertices,
            is_closed,
            layer,
        }))
    }

    /// 旧式 POLYLINE：头部之后跟随 VERTEX 记录，以 SEQEND 结束。
    fn parse_legacy_polyline(&mut self) -> Result<Entity, DxfError> {
        let mut layer = None;
        let mut flags: i16 = 0;
        loop {
            match self.reader.next_pair()? {
                Some((0, value)) => {
                    self.reader.put_back((0, value));
                    break;
                }
                Some((code, value)) => match code {
                    8 => layer = Some(value.trim().to_string()),
                    70 => flags = parse_i16(&value, "POLYLINE 标志（组码 70）")?,
                    _ => {}
                },
                None => return Err(DxfError::malformed("POLYLINE 未正确结束")),
            }
        }

        if flags & 0x40 != 0 {
            self.skip_polyline_sequence()?;
            return Err(DxfError::unsupported("POLYLINE (polyface)"));
        }
        if flags & 0x10 != 0 {
            self.skip_polyline_sequence()?;
            return Err(DxfError::unsupported("POLYLINE (mesh)"));
        }

        let mut vertices: Vec<Point2> = Vec::new();
        let mut failure: Option<DxfError> = None;
        loop {
            match self.reader.next_pair()? {
                Some((0, value)) => match value.trim() {
                    "VERTEX" => match self.parse_vertex() {
                        Ok(point) => vertices.push(point),
                        Err(err @ DxfError::Malformed { .. }) => return Err(err),
                        Err(err) => {
                            // 继续消费剩余顶点，保证序列整体被跳过
                            self.skip_entity_body()?;
                            failure.get_or_insert(err);
                        }
                    },
                    "SEQEND" => {
                        self.skip_entity_body()?;
                        break;
                    }
                    _ => {
                        self.reader.put_back((0, value));
                        break;
                    }
                },
                Some(_) => continue,
                None => return Err(DxfError::malformed("POLYLINE 缺少 SEQEND 终止标记")),
            }
        }

        if let Some(err) = failure {
            return Err(err);
        }
        if vertices.is_empty() {
            return Err(DxfError::invalid("POLYLINE 未解析到任何顶点"));
        }

        let layer = layer.unwrap_or_else(|| "0".to_string());
        Ok(Entity::LegacyPolyline(LegacyPolyline {
            vertices,
            is_closed: flags & 0x01 != 0,
            layer,
        }))
    }

    fn parse_vertex(&mut self) -> Result<Point2, DxfError> {
        let mut x = None;
        let mut y = None;
        loop {
            match self.reader.next_pair()? {
                Some((0, value)) => {
                    self.reader.put_back((0, value));
                    break;
                }
                Some((code, value)) => match code {
                    10 => assign_coord(&mut x, &value, "VERTEX X（组码 10）")?,
                    20 => assign_coord(&mut y, &value, "VERTEX Y（组码 20）")?,
                    _ => {}
                },
                None => return Err(DxfError::malformed("VERTEX 未正确结束")),
            }
        }
        let x = x.ok_or_else(|| DxfError::invalid("VERTEX 缺少 X（组码 10）"))?;
        let y = y.ok_or_else(|| DxfError::invalid("VERTEX 缺少 Y（组码 20）"))?;
        Ok(Point2::new(x, y))
    }

    fn skip_polyline_sequence(&mut self) -> Result<(), DxfError> {
        loop {
            match self.reader.next_pair()? {
                Some((0, value)) => match value.trim() {
                    "VERTEX" => self.skip_entity_body()?,
                    "SEQEND" => break,
                    _ => {
                        self.reader.put_back((0, value));
                        break;
                    }
                },
                Some(_) => continue,
                None => break,
            }
        }
        Ok(())
    }

    fn parse_insert(&mut self) -> Result<Entity, DxfError> {
        let mut layer = None;
        let mut name = None;
        let mut insert_x = None;
        let mut insert_y = None;
        let mut scale_x: Option<f64> = None;
        let mut scale_y: Option<f64> = None;
        let mut rotation_deg: f64 = 0.0;
        let mut failure: Option<DxfError> = None;

        loop {
            match self.reader.next_pair()? {
                Some((0, value)) => {
                    self.reader.put_back((0, value));
                    break;
                }
                Some((code, value)) => {
                    let outcome = match code {
                        8 => {
                            layer = Some(value.trim().to_string());
                            Ok(())
                        }
                        2 => {
                            name = Some(value.trim().to_string());
                            Ok(())
                        }
                        10 => assign_coord(&mut insert_x, &value, "INSERT 插入点 X（组码 10）"),
                        20 => assign_coord(&mut insert_y, &value, "INSERT 插入点 Y（组码 20）"),
                        41 => assign_coord(&mut scale_x, &value, "INSERT 缩放 X（组码 41）"),
                        42 => assign_coord(&mut scale_y, &value, "INSERT 缩放 Y（组码 42）"),
                        50 => parse_f64(&value, "INSERT 旋转角（组码 50）")
                            .map(|deg| rotation_deg = deg),
                        _ => Ok(()),
                    };
                    if let Err(err) = outcome {
                        failure.get_or_insert(err);
                    }
                }
                None => return Err(DxfError::malformed("INSERT 未正确结束")),
            }
        }

        // 属性记录总是随 INSERT 一起消费，即便 INSERT 本身无效
        loop {
            match self.reader.next_pair()? {
                Some((0, value)) => match value.trim() {
                    "ATTRIB" => self.skip_entity_body()?,
                    "SEQEND" => {
                        self.skip_entity_body()?;
                        break;
                    }
                    _ => {
                        self.reader.put_back((0, value));
                        break;
                    }
                },
                Some(_) => continue,
                None => break,
            }
        }

        if let Some(err) = failure {
            return Err(err);
        }

        let layer = layer.unwrap_or_else(|| "0".to_string());
        let name = name.ok_or_else(|| DxfError::invalid("INSERT 缺少块名（组码 2）"))?;
        let ix = insert_x.ok_or_else(|| DxfError::invalid("INSERT 缺少插入点 X（组码 10）"))?;
        let iy = insert_y.ok_or_else(|| DxfError::invalid("INSERT 缺少插入点 Y（组码 20）"))?;
        let sx = scale_x.unwrap_or(1.0);
        let sy = scale_y.unwrap_or(1.0);

        Ok(Entity::BlockReference(BlockReference {
            name,
            insert: Point2::new(ix, iy),
            scale: Vector2::new(sx, sy),
            rotation: rotation_deg.to_radians(),
            layer,
        }))
    }

    fn parse_hatch(&mut self) -> Result<Entity, DxfError> {
        struct PartialLoop {
            is_polyline: bool,
            vertices: Vec<Point2>,
            edges: Vec<HatchEdge>,
            pending_vertex_x: Option<f64>,
        }

        impl PartialLoop {
            fn new(flags: i32) -> Self {
                Self {
                    is_polyline: (flags & 0x02) != 0,
                    vertices: Vec::new(),
                    edges: Vec::new(),
                    pending_vertex_x: None,
                }
            }

            fn finalize_edge_builder(
                &mut self,
                builder: Option<EdgeBuilder>,
            ) -> Result<(), DxfError> {
                if let Some(edge_builder) = builder {
                    self.edges.push(edge_builder.finish()?);
                }
                Ok(())
            }

            fn finalize(self) -> Result<HatchLoop, DxfError> {
                if let Some(pending) = self.pending_vertex_x {
                    return Err(DxfError::invalid(format!(
                        "HATCH 顶点 X={pending} 缺少对应的 Y 坐标"
                    )));
                }
                if self.is_polyline {
                    Ok(HatchLoop::Vertices(self.vertices))
                } else {
                    Ok(HatchLoop::Edges(self.edges))
                }
            }
        }

        enum EdgeBuilder {
            Line {
                start: Option<Point2>,
                end: Option<Point2>,
            },
            Arc {
                center: Option<Point2>,
                radius: Option<f64>,
                start_angle: Option<f64>,
                end_angle: Option<f64>,
                is_counter_clockwise: bool,
            },
            /// 椭圆与样条边只识别类型，其数据字段全部忽略。
            Skipped(EdgeKind),
        }

        impl EdgeBuilder {
            fn new(edge_type: i32) -> Result<Self, DxfError> {
                match edge_type {
                    1 => Ok(Self::Line {
                        start: None,
                        end: None,
                    }),
                    2 => Ok(Self::Arc {
                        center: None,
                        radius: None,
                        start_angle: None,
                        end_angle: None,
                        is_counter_clockwise: true,
                    }),
                    3 => Ok(Self::Skipped(EdgeKind::Ellipse)),
                    4 => Ok(Self::Skipped(EdgeKind::Spline)),
                    other => Err(DxfError::invalid(format!(
                        "HATCH 未知的边界类型 {other}（组码 72）"
                    ))),
                }
            }

            fn finish(self) -> Result<HatchEdge, DxfError> {
                match self {
                    EdgeBuilder::Line { start, end } => {
                        let start =
                            start.ok_or_else(|| DxfError::invalid("HATCH 直线边缺少起点"))?;
                        let end = end.ok_or_else(|| DxfError::invalid("HATCH 直线边缺少终点"))?;
                        Ok(HatchEdge::Line { start, end })
                    }
                    EdgeBuilder::Arc {
                        center,
                        radius,
                        start_angle,
                        end_angle,
                        is_counter_clockwise,
                    } => {
                        let center =
                            center.ok_or_else(|| DxfError::invalid("HATCH 圆弧边缺少圆心"))?;
                        let radius =
                            radius.ok_or_else(|| DxfError::invalid("HATCH 圆弧边缺少半径"))?;
                        let start_deg = start_angle
                            .ok_or_else(|| DxfError::invalid("HATCH 圆弧边缺少起始角"))?;
                        let end_deg =
                            end_angle.ok_or_else(|| DxfError::invalid("HATCH 圆弧边缺少终止角"))?;
                        // 顺时针边的角度按镜像方向存储
                        let (start_angle, end_angle) = if is_counter_clockwise {
                            (start_deg.to_radians(), end_deg.to_radians())
                        } else {
                            ((-start_deg).to_radians(), (-end_deg).to_radians())
                        };
                        Ok(HatchEdge::Arc {
                            center,
                            radius,
                            start_angle,
                            end_angle,
                            is_counter_clockwise,
                        })
                    }
                    EdgeBuilder::Skipped(kind) => Ok(HatchEdge::Unsupported(kind)),
                }
            }
        }

        fn finalize_loop(
            current_loop: &mut Option<PartialLoop>,
            loops: &mut Vec<HatchLoop>,
            edge_builder: &mut Option<EdgeBuilder>,
        ) -> Result<(), DxfError> {
            if let Some(mut loop_data) = current_loop.take() {
                loop_data.finalize_edge_builder(edge_builder.take())?;
                loops.push(loop_data.finalize()?);
            }
            Ok(())
        }

        let mut layer = None;
        let mut loops: Vec<HatchLoop> = Vec::new();
        let mut current_loop: Option<PartialLoop> = None;
        let mut edge_builder: Option<EdgeBuilder> = None;
        // 边界数据之后的 10/20 为种子点，不再属于任何环路
        let mut boundary_done = false;
        let mut failure: Option<DxfError> = None;

        loop {
            let (code, value) = match self.reader.next_pair()? {
                Some((0, value)) => {
                    self.reader.put_back((0, value));
                    break;
                }
                Some(pair) => pair,
                None => return Err(DxfError::malformed("HATCH 未正确结束")),
            };
            if failure.is_some() {
                continue;
            }
            if code == 8 {
                layer = Some(value.trim().to_string());
                continue;
            }
            if boundary_done {
                continue;
            }

            let outcome: Result<(), DxfError> = match code {
                92 => finalize_loop(&mut current_loop, &mut loops, &mut edge_builder).and_then(
                    |()| {
                        let flags = parse_i32(&value, "HATCH 环路类型（组码 92）")?;
                        current_loop = Some(PartialLoop::new(flags));
                        Ok(())
                    },
                ),
                75 | 98 => {
                    boundary_done = true;
                    finalize_loop(&mut current_loop, &mut loops, &mut edge_builder)
                }
                72 => match current_loop.as_mut() {
                    Some(loop_data) if loop_data.is_polyline => Ok(()),
                    Some(loop_data) => loop_data
                        .finalize_edge_builder(edge_builder.take())
                        .and_then(|()| parse_i32(&value, "HATCH 边类型（组码 72）"))
                        .and_then(EdgeBuilder::new)
                        .map(|builder| edge_builder = Some(builder)),
                    None => Ok(()),
                },
                73 => match edge_builder.as_mut() {
                    Some(EdgeBuilder::Arc {
                        is_counter_clockwise,
                        ..
                    }) => parse_i32(&value, "HATCH 边方向标记（组码 73）")
                        .map(|flag| *is_counter_clockwise = flag != 0),
                    _ => Ok(()),
                },
                10 | 20 => match current_loop.as_mut() {
                    Some(loop_data) if loop_data.is_polyline => {
                        if code == 10 {
                            assign_coord(
                                &mut loop_data.pending_vertex_x,
                                &value,
                                "HATCH 顶点 X（组码 10）",
                            )
                        } else {
                            parse_f64(&value, "HATCH 顶点 Y（组码 20）").and_then(|y| {
                                let x = loop_data.pending_vertex_x.take().ok_or_else(|| {
                                    DxfError::invalid(
                                        "HATCH 顶点 Y 前未读取到对应的 X 值（组码 20）",
                                    )
                                })?;
                                loop_data.vertices.push(Point2::new(x, y));
                                Ok(())
                            })
                        }
                    }
                    Some(_) => match edge_builder.as_mut() {
                        Some(EdgeBuilder::Line { start: slot, .. })
                        | Some(EdgeBuilder::Arc { center: slot, .. }) => {
                            parse_f64(&value, "HATCH 边坐标（组码 10/20）")
                                .map(|v| set_axis(slot, code == 10, v))
                        }
                        _ => Ok(()),
                    },
                    None => Ok(()),
                },
                11 | 21 => match edge_builder.as_mut() {
                    Some(EdgeBuilder::Line { end, .. }) => {
                        parse_f64(&value, "HATCH 直线终点（组码 11/21）")
                            .map(|v| set_axis(end, code == 11, v))
                    }
                    _ => Ok(()),
                },
                40 => match edge_builder.as_mut() {
                    Some(EdgeBuilder::Arc { radius, .. }) => {
                        assign_coord(radius, &value, "HATCH 圆弧半径（组码 40）")
                    }
                    _ => Ok(()),
                },
                50 => match edge_builder.as_mut() {
                    Some(EdgeBuilder::Arc { start_angle, .. }) => {
                        assign_coord(start_angle, &value, "HATCH 圆弧起始角（组码 50）")
                    }
                    _ => Ok(()),
                },
                51 => match edge_builder.as_mut() {
                    Some(EdgeBuilder::Arc { end_angle, .. }) => {
                        assign_coord(end_angle, &value, "HATCH 圆弧终止角（组码 51）")
                    }
                    _ => Ok(()),
                },
                // 多段线环路的 bulge 不参与面积计算
                _ => Ok(()),
            };
            if let Err(err) = outcome {
                failure = Some(err);
            }
        }

        if let Some(err) = failure {
            return Err(err);
        }
        finalize_loop(&mut current_loop, &mut loops, &mut edge_builder)?;

        if loops.is_empty() {
            return Err(DxfError::invalid("HATCH 缺少边界定义"));
        }

        let layer = layer.unwrap_or_else(|| "0".to_string());
        Ok(Entity::Hatch(Hatch { loops, layer }))
    }

    fn skip_entity_body(&mut self) -> Result<(), DxfError> {
        loop {
            match self.reader.next_pair()? {
                Some((0, value)) => {
                    self.reader.put_back((0, value));
                    break;
                }
                Some(_) => continue,
                None => break,
            }
        }
        Ok(())
    }
}

struct DxfReader<'a> {
    lines: std::str::Lines<'a>,
    buffer: Vec<(i32, String)>,
    line_number: usize,
}

impl<'a> DxfReader<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            lines: source.lines(),
            buffer: Vec::new(),
            line_number: 0,
        }
    }

    /// 读取下一个组码/值对，跳过 999 注释。
    fn next_pair(&mut self) -> Result<Option<(i32, String)>, DxfError> {
        if let Some(pair) = self.buffer.pop() {
            return Ok(Some(pair));
        }

        loop {
            let code_line = match self.lines.next() {
                Some(line) => {
                    self.line_number += 1;
                    line
                }
                None => return Ok(None),
            };

            if code_line.trim().is_empty() && self.lines.clone().all(|l| l.trim().is_empty()) {
                return Ok(None);
            }

            let value_line = match self.lines.next() {
                Some(line) => {
                    self.line_number += 1;
                    line
                }
                None => {
                    return Err(DxfError::malformed(format!(
                        "文件在第 {} 行结束，缺少与组码对应的值行",
                        self.line_number
                    )));
                }
            };

            let code = code_line.trim().parse::<i32>().map_err(|_| {
                DxfError::malformed(format!(
                    "第 {} 行的组码 \"{}\" 无法解析为整数",
                    self.line_number - 1,
                    code_line.trim()
                ))
            })?;
            if code == 999 {
                continue;
            }
            let value = value_line.trim_end_matches('\r').to_string();
            return Ok(Some((code, value)));
        }
    }

    fn put_back(&mut self, pair: (i32, String)) {
        self.buffer.push(pair);
    }
}

impl DxfError {
    fn message(self) -> String {
        match self {
            DxfError::Unsupported { feature } => feature,
            DxfError::Invalid { message } | DxfError::Malformed { message } => message,
        }
    }
}

fn assign_coord(slot: &mut Option<f64>, raw: &str, context: &str) -> Result<(), DxfError> {
    if slot.is_some() {
        return Err(DxfError::invalid(format!("{context} 出现重复值")));
    }
    *slot = Some(parse_f64(raw, context)?);
    Ok(())
}

fn set_axis(slot: &mut Option<Point2>, is_x: bool, value: f64) {
    let point = slot.get_or_insert(Point2::new(f64::NAN, f64::NAN));
    if is_x {
        point.0.x = value;
    } else {
        point.0.y = value;
    }
}

fn parse_f64(raw: &str, context: &str) -> Result<f64, DxfError> {
    raw.trim()
        .parse::<f64>()
        .map_err(|_| DxfError::invalid(format!("{context} 解析失败（值：\"{raw}\"）")))
}

fn parse_i32(raw: &str, context: &str) -> Result<i32, DxfError> {
    raw.trim()
        .parse::<i32>()
        .map_err(|_| DxfError::invalid(format!("{context} 解析失败（值：\"{raw}\"）")))
}

fn parse_i16(raw: &str, context: &str) -> Result<i16, DxfError> {
    let value = parse_i32(raw, context)?;
    i16::try_from(value)
        .map_err(|_| DxfError::invalid(format!("{context} 超出 i16 范围（值：{value}）")))
}
